use crate::core::interfaces::FileSystemService;
use crate::utils::{KilnError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

impl TokioFileSystemService {
    /// All regular files below `root`, depth first. A missing root yields nothing.
    async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !root.exists() {
            return Ok(files);
        }

        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Self::collect_files(root).await
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            // Already gone is as good as deleted.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KilnError::Io(e)),
        }
    }

    async fn copy_tree(&self, from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
        let files = Self::collect_files(from).await?;
        let mut copied = Vec::with_capacity(files.len());

        for file in files {
            let relative = file
                .strip_prefix(from)
                .map_err(|_| KilnError::build(format!("{} is outside {}", file.display(), from.display())))?;
            let target = to.join(relative);

            if let Some(parent) = target.parent() {
                self.create_directory(parent).await?;
            }
            fs::copy(&file, &target)
                .await
                .map_err(|e| KilnError::copy(&file, e))?;
            copied.push(target);
        }

        Ok(copied)
    }

    async fn copy_files(&self, files: &[PathBuf], to_dir: &Path) -> Result<Vec<PathBuf>> {
        self.create_directory(to_dir).await?;
        let mut copied = Vec::with_capacity(files.len());

        for file in files {
            let name = file
                .file_name()
                .ok_or_else(|| KilnError::build(format!("{} has no file name", file.display())))?;
            let target = to_dir.join(name);

            fs::copy(file, &target)
                .await
                .map_err(|e| KilnError::copy(file, e))?;
            copied.push(target);
        }

        Ok(copied)
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        fs::write(path, content).await.map_err(KilnError::Io)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

impl TokioFileSystemService {
    async fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(KilnError::Io)
    }
}
