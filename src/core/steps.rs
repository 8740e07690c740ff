// Concrete pipeline steps: clean, static copy, vendor copy, bundle, reload

use crate::core::{interfaces::*, models::*};
use crate::utils::{Logger, Result, Timer};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static SOURCE_MAP_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*//[#@] sourceMappingURL=.*$\n?").unwrap()
});

pub const CLEAN: &str = "clean";
pub const COPY_STATIC: &str = "copy-static";
pub const COPY_VENDOR: &str = "copy-vendor";
pub const BUNDLE: &str = "bundle";
pub const RELOAD: &str = "reload";

/// Empties the artifact store unless the caller asked to keep existing files.
pub struct CleanStep {
    fs: Arc<dyn FileSystemService>,
    layout: Arc<ProjectLayout>,
    skip_clean: bool,
}

impl CleanStep {
    pub fn new(fs: Arc<dyn FileSystemService>, layout: Arc<ProjectLayout>, skip_clean: bool) -> Self {
        Self { fs, layout, skip_clean }
    }
}

#[async_trait::async_trait]
impl PipelineStep for CleanStep {
    fn name(&self) -> &str {
        CLEAN
    }

    async fn run(&self) -> Result<()> {
        if self.skip_clean {
            Logger::debug("Keeping existing build files");
            return Ok(());
        }

        // Deletion problems never fail the run.
        match self.fs.clean_files(&self.layout.build_dir).await {
            Ok(removed) => Logger::debug(&format!(
                "Removed {} file(s) from {}",
                removed,
                self.layout.display_path(&self.layout.build_dir).display()
            )),
            Err(e) => Logger::warn(&format!("Clean incomplete: {}", e)),
        }

        Ok(())
    }
}

pub struct CopyStaticStep {
    fs: Arc<dyn FileSystemService>,
    layout: Arc<ProjectLayout>,
}

impl CopyStaticStep {
    pub fn new(fs: Arc<dyn FileSystemService>, layout: Arc<ProjectLayout>) -> Self {
        Self { fs, layout }
    }
}

#[async_trait::async_trait]
impl PipelineStep for CopyStaticStep {
    fn name(&self) -> &str {
        COPY_STATIC
    }

    async fn run(&self) -> Result<()> {
        if !self.fs.file_exists(&self.layout.static_dir) {
            Logger::warn(&format!(
                "Static directory {} not found, nothing to copy",
                self.layout.display_path(&self.layout.static_dir).display()
            ));
            return Ok(());
        }

        let copied = self
            .fs
            .copy_tree(&self.layout.static_dir, &self.layout.build_dir)
            .await?;
        Logger::debug(&format!("Copied {} static file(s)", copied.len()));
        Ok(())
    }
}

pub struct CopyVendorStep {
    fs: Arc<dyn FileSystemService>,
    layout: Arc<ProjectLayout>,
    mode: BuildMode,
}

impl CopyVendorStep {
    pub fn new(fs: Arc<dyn FileSystemService>, layout: Arc<ProjectLayout>, mode: BuildMode) -> Self {
        Self { fs, layout, mode }
    }
}

#[async_trait::async_trait]
impl PipelineStep for CopyVendorStep {
    fn name(&self) -> &str {
        COPY_VENDOR
    }

    async fn run(&self) -> Result<()> {
        let sources = self.layout.vendor_sources(self.mode);
        let copied = self
            .fs
            .copy_files(&sources, &self.layout.scripts_dir())
            .await?;
        Logger::debug(&format!("Copied {} vendor file(s)", copied.len()));
        Ok(())
    }
}

/// Bundles the entry module. Errors are soft so a broken edit never kills the watch loop.
pub struct BundleStep {
    fs: Arc<dyn FileSystemService>,
    bundler: Arc<dyn JsBundler>,
    layout: Arc<ProjectLayout>,
    mode: BuildMode,
}

impl BundleStep {
    pub fn new(
        fs: Arc<dyn FileSystemService>,
        bundler: Arc<dyn JsBundler>,
        layout: Arc<ProjectLayout>,
        mode: BuildMode,
    ) -> Self {
        Self { fs, bundler, layout, mode }
    }

    async fn write_outputs(&self, output: BundleOutput) -> Result<Vec<OutputFile>> {
        let _timer = Timer::start("Writing bundle");
        let mut written = Vec::new();

        let mut code = strip_source_map_comments(&output.code);

        if let Some(map) = output.source_map {
            if !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&format!(
                "//# sourceMappingURL={}\n",
                self.layout.source_map_file_name()
            ));

            let map_path = self.layout.source_map_path();
            self.fs.write_file(&map_path, &map).await?;
            written.push(OutputFile { path: map_path, size: map.len() });
        }

        let bundle_path = self.layout.bundle_path();
        self.fs.write_file(&bundle_path, &code).await?;
        written.insert(0, OutputFile { path: bundle_path, size: code.len() });

        Ok(written)
    }
}

#[async_trait::async_trait]
impl PipelineStep for BundleStep {
    fn name(&self) -> &str {
        BUNDLE
    }

    fn policy(&self) -> StepPolicy {
        StepPolicy::LogAndContinue
    }

    async fn run(&self) -> Result<()> {
        Logger::build_mode(self.mode);

        let output = self
            .bundler
            .bundle(&self.layout.entry_file, self.mode, &self.layout.output_file)
            .await?;

        for file in self.write_outputs(output).await? {
            Logger::output_file(
                &self.layout.display_path(&file.path).display().to_string(),
                file.size,
            );
        }

        Ok(())
    }
}

pub struct ReloadStep {
    reloader: Arc<dyn ReloadSignal>,
}

impl ReloadStep {
    pub fn new(reloader: Arc<dyn ReloadSignal>) -> Self {
        Self { reloader }
    }
}

#[async_trait::async_trait]
impl PipelineStep for ReloadStep {
    fn name(&self) -> &str {
        RELOAD
    }

    async fn run(&self) -> Result<()> {
        self.reloader.reload().await
    }
}

/// Used when no dev server is attached.
pub struct NoopReload;

#[async_trait::async_trait]
impl ReloadSignal for NoopReload {
    async fn reload(&self) -> Result<()> {
        Logger::debug("No dev server attached, skipping reload");
        Ok(())
    }
}

/// Drop inline `sourceMappingURL` comments so only the external reference remains.
pub fn strip_source_map_comments(code: &str) -> String {
    SOURCE_MAP_COMMENT.replace_all(code, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_source_map_comments() {
        let code = "var a = 1;\n//# sourceMappingURL=data:application/json;base64,AAAA\nvar b = 2;\n  //@ sourceMappingURL=old.map\n";
        let stripped = strip_source_map_comments(code);

        assert_eq!(stripped, "var a = 1;\nvar b = 2;\n");
    }

    #[test]
    fn test_strip_keeps_unrelated_comments() {
        let code = "// sourceMappingURL is mentioned here\nvar a = 1;";
        assert_eq!(strip_source_map_comments(code), code);
    }

    /// Real file system whose deletes fail for one file name.
    struct LockedFile {
        inner: crate::infrastructure::TokioFileSystemService,
        locked: &'static str,
    }

    #[async_trait::async_trait]
    impl FileSystemService for LockedFile {
        async fn list_files(&self, root: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
            self.inner.list_files(root).await
        }

        async fn remove_file(&self, path: &std::path::Path) -> Result<()> {
            if path.file_name().is_some_and(|name| name == self.locked) {
                return Err(crate::utils::KilnError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "locked",
                )));
            }
            self.inner.remove_file(path).await
        }

        async fn copy_tree(&self, from: &std::path::Path, to: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
            self.inner.copy_tree(from, to).await
        }

        async fn copy_files(&self, files: &[std::path::PathBuf], to_dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
            self.inner.copy_files(files, to_dir).await
        }

        async fn write_file(&self, path: &std::path::Path, content: &str) -> Result<()> {
            self.inner.write_file(path, content).await
        }

        fn file_exists(&self, path: &std::path::Path) -> bool {
            self.inner.file_exists(path)
        }
    }

    #[tokio::test]
    async fn test_clean_continues_past_undeletable_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(ProjectLayout::new(dir.path()));
        for file in ["a.txt", "index.html", "scripts/game.js"] {
            let path = layout.build_dir.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "stale").unwrap();
        }

        let fs = Arc::new(LockedFile {
            inner: crate::infrastructure::TokioFileSystemService,
            locked: "a.txt",
        });
        assert_eq!(fs.clean_files(&layout.build_dir).await.unwrap(), 2);

        std::fs::write(layout.build_dir.join("index.html"), "stale").unwrap();
        let step = CleanStep::new(fs, layout.clone(), false);
        step.run().await.unwrap();

        assert!(layout.build_dir.join("a.txt").exists());
        assert!(!layout.build_dir.join("index.html").exists());
        assert!(!layout.build_dir.join("scripts/game.js").exists());
    }

    #[tokio::test]
    async fn test_skip_clean_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(ProjectLayout::new(dir.path()));
        std::fs::create_dir_all(&layout.build_dir).unwrap();
        std::fs::write(layout.build_dir.join("index.html"), "kept").unwrap();

        let step = CleanStep::new(
            Arc::new(crate::infrastructure::TokioFileSystemService),
            layout.clone(),
            true,
        );
        step.run().await.unwrap();

        assert!(layout.build_dir.join("index.html").exists());
    }

    #[test]
    fn test_bundle_step_is_soft() {
        struct Never;

        #[async_trait::async_trait]
        impl JsBundler for Never {
            async fn bundle(&self, _: &std::path::Path, _: BuildMode, _: &str) -> Result<BundleOutput> {
                unreachable!()
            }
        }

        let step = BundleStep::new(
            Arc::new(crate::infrastructure::TokioFileSystemService),
            Arc::new(Never),
            Arc::new(ProjectLayout::new(".")),
            BuildMode::Development,
        );
        assert_eq!(step.policy(), StepPolicy::LogAndContinue);
        assert_eq!(step.name(), BUNDLE);
    }
}
