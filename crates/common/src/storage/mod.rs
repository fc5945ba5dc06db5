//! Blob storage abstraction for uploaded invoice documents
//!
//! The gateway writes the raw PDF once at upload time; the extraction
//! worker reads it back when a job is picked up. Keys are
//! collision-resistant: a millisecond timestamp prefix plus the
//! sanitized original file name.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob under the given key
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch a blob by key
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Replace anything outside `[A-Za-z0-9.-]` with underscores
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Build a collision-resistant storage key for an upload
pub fn storage_key(file_name: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{}_{}", timestamp, sanitize_file_name(file_name))
}

/// Filesystem-backed blob store
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys are generated by storage_key(); reject anything that could
        // escape the root.
        if key.contains("..") || key.contains('/') || key.contains('\\') {
            return Err(AppError::Storage {
                message: format!("invalid blob key: {}", key),
            });
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await.map_err(|e| AppError::Storage {
            message: format!("failed to write {}: {}", path.display(), e),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(|e| AppError::Storage {
            message: format!("failed to read {}: {}", path.display(), e),
        })
    }
}

/// In-memory blob store for testing
pub struct MemoryBlobStore {
    blobs: tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::Storage {
                message: format!("blob not found: {}", key),
            })
    }
}

/// Check the PDF magic bytes of an upload
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("invoice 2024 (1).pdf"), "invoice_2024__1_.pdf");
        assert_eq!(sanitize_file_name("plain-name.pdf"), "plain-name.pdf");
    }

    #[test]
    fn test_storage_key_keeps_extension() {
        let key = storage_key("water bill.pdf");
        assert!(key.ends_with("_water_bill.pdf"));
    }

    #[test]
    fn test_pdf_magic() {
        assert!(looks_like_pdf(b"%PDF-1.7 rest"));
        assert!(!looks_like_pdf(b"GIF89a"));
    }

    #[tokio::test]
    async fn test_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.put("123_test.pdf", b"%PDF-1.4").await.unwrap();
        let bytes = store.get("123_test.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_fs_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.get("../outside").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_missing_key() {
        let store = MemoryBlobStore::new();
        assert!(store.get("nope").await.is_err());
    }
}
