//! Document store
//!
//! Blob storage addressed by opaque keys. The core never interprets a key;
//! the local implementation only refuses keys that would leave its root.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and until when a client may upload an object
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadHandle {
    pub provider: &'static str,
    pub key: String,
    pub path: String,
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn issue_upload_handle(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<UploadHandle, StorageError>;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    async fn materialize_key(&self, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Files under a local directory
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
    handle_ttl: Duration,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>, handle_ttl_seconds: i64) -> Self {
        Self {
            root: root.into(),
            handle_ttl: Duration::seconds(handle_ttl_seconds),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key under the root. Only plain relative segments are allowed.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn issue_upload_handle(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<UploadHandle, StorageError> {
        let path = self.resolve(key)?;
        Ok(UploadHandle {
            provider: "local",
            key: key.to_string(),
            path: path.to_string_lossy().replace('\\', "/"),
            content_type: content_type.to_string(),
            expires_at: Utc::now() + self.handle_ttl,
        })
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key = %key, size = bytes.len(), "Stored object");
        Ok(())
    }

    async fn materialize_key(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalDocumentStore {
        let root = std::env::temp_dir().join(format!("rfp-store-{}", uuid::Uuid::new_v4()));
        LocalDocumentStore::new(root, 900)
    }

    #[test]
    fn rejects_keys_outside_root() {
        let store = temp_store();
        for key in ["../etc/passwd", "/abs/path", "a/../../b", "", "./x"] {
            assert!(
                matches!(store.issue_upload_handle(key, "text/plain"), Err(StorageError::InvalidKey(_))),
                "{}",
                key
            );
        }
    }

    #[test]
    fn handle_points_into_root() {
        let store = temp_store();
        let handle = store.issue_upload_handle("rfps/1/scope.pdf", "application/pdf").unwrap();
        assert_eq!(handle.provider, "local");
        assert!(handle.path.ends_with("rfps/1/scope.pdf"));
        assert!(handle.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn put_then_materialize() {
        let store = temp_store();
        store.put("a/b.txt", b"hello").await.unwrap();
        assert_eq!(store.materialize_key("a/b.txt").await.unwrap(), b"hello");
        assert!(matches!(
            store.materialize_key("a/missing.txt").await,
            Err(StorageError::NotFound(_))
        ));
        let _ = std::fs::remove_dir_all(store.root());
    }
}
