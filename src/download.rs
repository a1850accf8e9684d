//! Download sinks for finished documents.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::host::{DeliveredFile, DownloadSink};
use crate::{DexError, Result};

/// Writes documents into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct FileDownload {
    dir: PathBuf,
}

impl FileDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for FileDownload {
    async fn deliver(&self, filename: &str, bytes: Vec<u8>) -> Result<DeliveredFile> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| DexError::Unknown(format!("invalid output filename: {filename}")))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let size = bytes.len() as u64;
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), size, "document written");
        Ok(DeliveredFile {
            location: Some(path),
            size,
        })
    }
}

/// Keeps delivered documents in memory.
#[derive(Debug, Default)]
pub struct MemoryDownload {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryDownload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(filename, bytes)` pairs, oldest first.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

#[async_trait]
impl DownloadSink for MemoryDownload {
    async fn deliver(&self, filename: &str, bytes: Vec<u8>) -> Result<DeliveredFile> {
        let size = bytes.len() as u64;
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.push((filename.to_string(), bytes));
        Ok(DeliveredFile {
            location: None,
            size,
        })
    }
}
