mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over blob storage backends.
/// Keys are storage paths of the form `{owner_id}/{name}`; the blobs carry no metadata of
/// their own, so they are meaningless without the file catalog.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Deleting a key that does not exist succeeds.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    /// Keys under `prefix` (a `/`-separated key prefix, empty for everything), sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    /// Delete several keys, reporting the outcome of each one.
    async fn delete_many(&self, keys: &[String]) -> Vec<(String, Result<(), ObjectStoreError>)> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let result = self.delete(key).await;
            results.push((key.clone(), result));
        }
        results
    }
}
