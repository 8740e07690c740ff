use crate::core::models::*;
use crate::utils::{Logger, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    /// Every regular file below `root`. A missing root has none.
    async fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Delete one file. A file that is already gone counts as deleted.
    async fn remove_file(&self, path: &Path) -> Result<()>;

    /// Delete every file below `root`, leaving directories in place. Returns the count removed.
    /// A file that cannot be deleted is logged and skipped.
    async fn clean_files(&self, root: &Path) -> Result<usize> {
        let mut removed = 0;
        for file in self.list_files(root).await? {
            match self.remove_file(&file).await {
                Ok(()) => removed += 1,
                Err(e) => Logger::warn(&format!("Cannot delete {}: {}", file.display(), e)),
            }
        }
        Ok(removed)
    }

    /// Copy the tree under `from` into `to`, preserving relative paths.
    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<Vec<PathBuf>>;
    /// Copy each file into `to_dir` under its own file name.
    async fn copy_files(&self, files: &[PathBuf], to_dir: &Path) -> Result<Vec<PathBuf>>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Turns an entry module into one bundled script
#[async_trait]
pub trait JsBundler: Send + Sync {
    async fn bundle(&self, entry: &Path, mode: BuildMode, output_file: &str) -> Result<BundleOutput>;
}

/// Tells connected browsers to reload
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

/// One unit of work inside a pipeline
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> StepPolicy {
        StepPolicy::Fatal
    }

    async fn run(&self) -> Result<()>;
}
