//! Injected file-system seam.
//!
//! The store never touches the disk directly; it goes through a
//! [`StorageBackend`] supplied by the host. This keeps the store free of any
//! compile-time dependency on a particular host application's file API, and
//! lets tests substitute an in-memory or failure-injecting backend.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

/// Minimal asynchronous file interface the store needs.
///
/// `mkdir` must be idempotent: creating a directory that already exists is a
/// no-op, not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn exists(&self, path: &Path) -> io::Result<bool>;
    async fn read(&self, path: &Path) -> io::Result<String>;
    async fn write(&self, path: &Path, text: &str) -> io::Result<()>;
    /// List the entries of a directory. A missing directory yields an empty
    /// list rather than an error.
    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
    async fn mkdir(&self, path: &Path) -> io::Result<()>;
}

/// Real file-system backend over tokio::fs
#[derive(Debug, Default)]
pub struct FsBackend;

#[async_trait]
impl StorageBackend for FsBackend {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, text: &str) -> io::Result<()> {
        tokio::fs::write(path, text).await
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        Ok(paths)
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        // create_dir_all already treats an existing directory as success
        tokio::fs::create_dir_all(path).await
    }
}

/// In-memory backend for tests and ephemeral hosts
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently held
    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Direct access to a file's contents, for assertions
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Overwrite a file without going through the store, simulating another
    /// device syncing into the same directory
    pub fn put(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), text.into());
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn read(&self, path: &Path) -> io::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    async fn write(&self, path: &Path, text: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    async fn mkdir(&self, _path: &Path) -> io::Result<()> {
        // Directories are implicit
        Ok(())
    }
}
