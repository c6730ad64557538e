//! Filesystem seam used by the blob manager.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

/// Injected filesystem capability. Carries no protocol logic.
#[async_trait]
pub trait FileSystemAdapter: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Length of the file at `path` in bytes.
    async fn file_size(&self, path: &Path) -> io::Result<u64>;

    async fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Create `path` and its parents. Succeeds if it already exists.
    async fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Locate a file named `filename` somewhere below `dir`.
    async fn find_file(&self, dir: &Path, filename: &str) -> io::Result<Option<PathBuf>>;
}

/// [`FileSystemAdapter`] over the real filesystem via `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl FileSystemAdapter for TokioFs {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data).await
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    // Breadth-first, so a file directly under `dir` wins over one nested
    // in a conversation folder.
    async fn find_file(&self, dir: &Path, filename: &str) -> io::Result<Option<PathBuf>> {
        if !fs::try_exists(dir).await? {
            return Ok(None);
        }

        let mut pending = VecDeque::from([dir.to_path_buf()]);
        while let Some(current) = pending.pop_front() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %current.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push_back(entry.path());
                } else if file_type.is_file() && entry.file_name() == filename {
                    let found = entry.path();
                    debug!(path = %found.display(), "Found file");
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }
}
