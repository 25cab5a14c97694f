// Blob fetch collaborator.
//
// Source code, test inputs, and expected outputs arrive as opaque keys;
// this seam turns a key into UTF-8 text. Not-found is a distinct error
// because it maps to FILE_ERROR while everything else maps to
// INTERNAL_ERROR.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use thiserror::Error;

use crate::config::BlobBackend;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob fetch failed: {0}")]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<String, BlobError>;
}

pub fn from_backend(backend: &BlobBackend) -> Arc<dyn BlobStore> {
    match backend {
        BlobBackend::Filesystem(root) => Arc::new(FsBlobStore::new(root.clone())),
        BlobBackend::Http(base_url) => Arc::new(HttpBlobStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }),
    }
}

/// Keys are paths relative to a local root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        FsBlobStore { root }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, key: &str) -> Result<String, BlobError> {
        if key.split('/').any(|part| part == "..") {
            return Err(BlobError::Other(anyhow!("blob key escapes the root: {key}")));
        }
        let path = self.root.join(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Other(
                anyhow!(e).context(format!("failed to read blob {}", path.display())),
            )),
        }
    }
}

/// Keys are appended to a base URL; a 404 response means not found.
pub struct HttpBlobStore {
    base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, key: &str) -> Result<String, BlobError> {
        let url = format!("{}/{}", self.base_url, key.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlobError::Other(anyhow!(e).context(format!("GET {url}"))))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(key.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| BlobError::Other(anyhow!(e).context(format!("GET {url}"))))?;
        response
            .text()
            .await
            .map_err(|e| BlobError::Other(anyhow!(e).context(format!("reading body of {url}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_store_reads_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("code.c"), "int main(){}").await.unwrap();

        let store = FsBlobStore::new(dir.path().to_path_buf());
        assert_eq!(store.fetch("code.c").await.unwrap(), "int main(){}");
    }

    #[tokio::test]
    async fn fs_store_reads_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
        tokio::fs::write(dir.path().join("sub/in.txt"), "1 2").await.unwrap();

        let store = FsBlobStore::new(dir.path().to_path_buf());
        assert_eq!(store.fetch("sub/in.txt").await.unwrap(), "1 2");
    }

    #[tokio::test]
    async fn fs_store_distinguishes_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        match store.fetch("missing.txt").await {
            Err(BlobError::NotFound(key)) => assert_eq!(key, "missing.txt"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.fetch("../etc/passwd").await,
            Err(BlobError::Other(_))
        ));
    }
}
