use crate::core::{interfaces::*, models::*, services::*, session::DevSession};
use crate::infrastructure::{serve, OxcBundler, ProjectWatcher, TokioFileSystemService, WatchConfig};
use crate::utils::{ConfigLoader, KilnConfig, Logger, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "Build pipeline and live-reload dev server for browser games")]
pub struct Cli {
    /// Production build: minified bundle, no source maps, minified engine only
    #[arg(long, global = true)]
    pub production: bool,

    /// Project root directory
    #[arg(short, long, default_value = ".", global = true)]
    pub root: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Build, serve the build directory and rebuild on change (default)
    Dev {
        /// Port to serve on [default: 3000]
        #[arg(short, long)]
        port: Option<u16>,
        /// Interface to bind [default: 127.0.0.1]
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one full build
    Build,
    /// Delete every file under the build directory
    Clean,
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        Logger::init(cli.verbose);

        let root = PathBuf::from(&cli.root);
        let file_config = ConfigLoader::load_from_file(&root)?;
        let mode = BuildMode::from_production_flag(cli.production);

        let command = cli.command.unwrap_or(Commands::Dev {
            port: None,
            host: None,
        });

        match command {
            Commands::Dev { port, host } => {
                self.handle_dev_command(root, mode, file_config, port, host).await
            }
            Commands::Build => self.handle_build_command(root, mode, file_config).await,
            Commands::Clean => self.handle_clean_command(root, mode, file_config).await,
        }
    }

    async fn handle_build_command(
        &self,
        root: PathBuf,
        mode: BuildMode,
        file_config: Option<KilnConfig>,
    ) -> Result<()> {
        let orchestrator = create_orchestrator(root, mode, file_config.as_ref())?;
        orchestrator.run(PipelineKind::FullBuild).await?;
        Ok(())
    }

    async fn handle_clean_command(
        &self,
        root: PathBuf,
        mode: BuildMode,
        file_config: Option<KilnConfig>,
    ) -> Result<()> {
        let orchestrator = create_orchestrator(root, mode, file_config.as_ref())?;
        let removed = orchestrator.clean().await?;
        Logger::info(&format!(
            "🧹 Removed {} file(s) from {}",
            removed,
            orchestrator.layout().build_dir.display()
        ));
        Ok(())
    }

    async fn handle_dev_command(
        &self,
        root: PathBuf,
        mode: BuildMode,
        file_config: Option<KilnConfig>,
        port: Option<u16>,
        host: Option<String>,
    ) -> Result<()> {
        Logger::info("🚀 kiln - development server");
        Logger::info(&format!("📁 Root: {}", root.display()));

        let server_config = ConfigLoader::server(file_config.as_ref(), port, host);
        let debounce = ConfigLoader::debounce(file_config.as_ref());
        let orchestrator = create_orchestrator(root, mode, file_config.as_ref())?;

        // The first build must succeed before anything is served.
        orchestrator.run(PipelineKind::FullBuild).await?;

        let server = serve(orchestrator.layout().build_dir.clone(), &server_config).await?;
        let layout = orchestrator.layout().clone();
        let orchestrator = Arc::new(orchestrator.with_reloader(Arc::new(server.clone())));

        let (_watcher, triggers) = ProjectWatcher::start(WatchConfig::new(
            layout.source_dir.clone(),
            layout.static_dir.clone(),
        ))?;

        Logger::info("Press Ctrl+C to stop the server");

        let session = DevSession::new(orchestrator, debounce);
        tokio::select! {
            _ = session.run(triggers) => {}
            _ = tokio::signal::ctrl_c() => {
                Logger::info("👋 Stopping dev server");
            }
        }

        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn create_orchestrator(
    root: PathBuf,
    mode: BuildMode,
    file_config: Option<&KilnConfig>,
) -> Result<BuildOrchestrator> {
    let layout = ConfigLoader::layout(file_config, root);

    let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
    let bundler: Arc<dyn JsBundler> = Arc::new(
        OxcBundler::new(&layout.root, &layout.target)?.with_search_path(&layout.source_dir),
    );

    Ok(BuildOrchestrator::new(layout, mode, fs_service, bundler))
}
