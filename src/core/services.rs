use crate::core::{interfaces::*, models::*, pipeline::Pipeline, steps::*};
use crate::utils::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Builds the named pipelines and runs them one at a time.
pub struct BuildOrchestrator {
    layout: Arc<ProjectLayout>,
    mode: BuildMode,
    fs_service: Arc<dyn FileSystemService>,
    bundler: Arc<dyn JsBundler>,
    reloader: Arc<dyn ReloadSignal>,
    run_lock: Mutex<()>,
}

impl BuildOrchestrator {
    pub fn new(
        layout: ProjectLayout,
        mode: BuildMode,
        fs_service: Arc<dyn FileSystemService>,
        bundler: Arc<dyn JsBundler>,
    ) -> Self {
        Self {
            layout: Arc::new(layout),
            mode,
            fs_service,
            bundler,
            reloader: Arc::new(NoopReload),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_reloader(mut self, reloader: Arc<dyn ReloadSignal>) -> Self {
        self.reloader = reloader;
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// clean → copy-static → copy-vendor
    pub fn static_assembly(&self, skip_clean: bool) -> Pipeline {
        Pipeline::new(PipelineKind::StaticAssembly.name())
            .then(Arc::new(CleanStep::new(
                self.fs_service.clone(),
                self.layout.clone(),
                skip_clean,
            )))
            .then(Arc::new(CopyStaticStep::new(
                self.fs_service.clone(),
                self.layout.clone(),
            )))
            .then(Arc::new(CopyVendorStep::new(
                self.fs_service.clone(),
                self.layout.clone(),
                self.mode,
            )))
    }

    /// StaticAssembly → bundle
    pub fn full_build(&self) -> Pipeline {
        self.static_assembly(false)
            .renamed(PipelineKind::FullBuild.name())
            .then(Arc::new(BundleStep::new(
                self.fs_service.clone(),
                self.bundler.clone(),
                self.layout.clone(),
                self.mode,
            )))
    }

    /// FullBuild → reload
    pub fn watch_on_source(&self) -> Pipeline {
        self.full_build()
            .renamed(PipelineKind::WatchOnSource.name())
            .then(self.reload_step())
    }

    /// StaticAssembly with existing files kept → reload
    pub fn watch_on_static(&self) -> Pipeline {
        self.static_assembly(true)
            .renamed(PipelineKind::WatchOnStatic.name())
            .then(self.reload_step())
    }

    pub fn pipeline(&self, kind: PipelineKind) -> Pipeline {
        match kind {
            PipelineKind::StaticAssembly => self.static_assembly(false),
            PipelineKind::FullBuild => self.full_build(),
            PipelineKind::WatchOnSource => self.watch_on_source(),
            PipelineKind::WatchOnStatic => self.watch_on_static(),
        }
    }

    pub async fn run(&self, kind: PipelineKind) -> Result<PipelineReport> {
        self.run_pipeline(self.pipeline(kind)).await
    }

    /// Runs never overlap: the lock is held for the whole pipeline.
    pub async fn run_pipeline(&self, pipeline: Pipeline) -> Result<PipelineReport> {
        let _guard = self.run_lock.lock().await;
        pipeline.run().await
    }

    /// Delete every file in the artifact store without running a pipeline.
    pub async fn clean(&self) -> Result<usize> {
        let _guard = self.run_lock.lock().await;
        self.fs_service.clean_files(&self.layout.build_dir).await
    }

    fn reload_step(&self) -> Arc<dyn PipelineStep> {
        Arc::new(ReloadStep::new(self.reloader.clone()))
    }
}
