use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::StoredAnalysis;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to uploaded documents, addressed by bucket and path.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError>;
}

/// Blob storage backed by a local directory: `<root>/<bucket>/<path>`.
#[derive(Debug, Clone)]
pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        for segment in [bucket, path] {
            let candidate = Path::new(segment);
            let escapes = segment.is_empty()
                || candidate
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(StorageError::InvalidPath(format!("{}/{}", bucket, path)));
            }
        }
        Ok(self.root.join(bucket).join(path))
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.resolve(bucket, path)?;
        debug!(path = %full_path.display(), "Reading blob");

        match tokio::fs::read(&full_path).await {
            Ok(bytes) => {
                info!(bucket, path, bytes = bytes.len(), "Downloaded document");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Where accepted analyses go once they pass the storage gate.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, analysis: StoredAnalysis) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<StoredAnalysis>, StorageError>;
}

#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    analyses: DashMap<String, StoredAnalysis>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save(&self, analysis: StoredAnalysis) -> Result<(), StorageError> {
        self.analyses.insert(analysis.id.clone(), analysis);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StoredAnalysis>, StorageError> {
        Ok(self.analyses.get(id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lab-report-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("reports")).unwrap();
        dir
    }

    #[tokio::test]
    async fn downloads_files_under_the_root() {
        let root = scratch_dir("download");
        std::fs::write(root.join("reports").join("a.pdf"), b"%PDF-1.4").unwrap();
        let storage = FsBlobStorage::new(&root);

        let bytes = storage.download("reports", "a.pdf").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let missing = storage.download("reports", "b.pdf").await.unwrap_err();
        assert!(matches!(missing, StorageError::NotFound { .. }));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[tokio::test]
    async fn traversal_outside_the_root_is_rejected() {
        let storage = FsBlobStorage::new("/tmp/does-not-matter");

        for (bucket, path) in [("reports", "../secret"), ("..", "a.pdf"), ("reports", "/etc/passwd")] {
            let err = storage.download(bucket, path).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath(_)), "{bucket}/{path}");
        }
    }
}
