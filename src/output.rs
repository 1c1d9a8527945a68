//! Destination file handling
//!
//! The output file is opened once per job and shared by every worker.
//! Writes are positioned (`pwrite` on Unix, `seek_write` on Windows) so no
//! worker ever moves a shared cursor.

use crate::error::{EngineError, Result, StorageErrorKind};
use bytes::Bytes;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;

/// Shared handle to a job's destination file
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
    file: Arc<File>,
}

impl OutputFile {
    /// Create (or truncate) the destination file
    pub async fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| {
                EngineError::storage(
                    StorageErrorKind::Io,
                    path,
                    format!("Create failed: {}", e),
                )
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file.into_std().await),
        })
    }

    /// Path of the destination file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pre-size the file so disjoint writes never extend it concurrently
    pub async fn preallocate(&self, len: u64) -> Result<()> {
        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        run_blocking(&self.path, move || {
            file.set_len(len).map_err(|e| {
                EngineError::storage(
                    StorageErrorKind::Io,
                    path,
                    format!("Pre-allocate failed: {}", e),
                )
            })
        })
        .await
    }

    /// Write a whole buffer at an absolute offset
    pub async fn write_at(&self, offset: u64, data: Bytes) -> Result<()> {
        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        run_blocking(&self.path, move || {
            write_all_at(&file, &data, offset).map_err(|e| {
                EngineError::storage(
                    StorageErrorKind::Io,
                    path,
                    format!("Write at offset {} failed: {}", offset, e),
                )
            })
        })
        .await
    }

    /// Flush file contents to disk
    pub async fn sync(&self) -> Result<()> {
        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        run_blocking(&self.path, move || {
            file.sync_all().map_err(|e| {
                EngineError::storage(StorageErrorKind::Io, path, format!("Sync failed: {}", e))
            })
        })
        .await
    }
}

async fn run_blocking<F>(path: &Path, op: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await.map_err(|e| {
        EngineError::storage(
            StorageErrorKind::Io,
            path,
            format!("File task aborted: {}", e),
        )
    })?
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_disjoint_writes_land_at_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let out = OutputFile::create(&path).await.unwrap();
        out.preallocate(10).await.unwrap();

        // Out of order on purpose
        out.write_at(5, Bytes::from_static(b"fghij")).await.unwrap();
        out.write_at(0, Bytes::from_static(b"abcde")).await.unwrap();
        out.sync().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn test_preallocate_sets_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sized.bin");
        let out = OutputFile::create(&path).await.unwrap();
        out.preallocate(4096).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_create_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.bin");
        assert!(matches!(
            OutputFile::create(&path).await,
            Err(EngineError::Storage { .. })
        ));
    }
}
