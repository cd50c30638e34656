use thiserror::Error;

use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

/// Failure of a lifecycle or share operation.
///
/// Business-rule violations are detected before any write; `StorageUnavailable` and
/// `UploadFailed` wrap backend I/O and are never retried here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("File not found")]
    NotFound,
    #[error("You do not have access to this file")]
    Forbidden,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("This share link has expired")]
    Expired,
    #[error("This share link is password protected")]
    PasswordRequired,
    #[error("File exceeds maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ServiceError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServiceError::InvalidState(message.into())
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        ServiceError::StorageUnavailable(e.to_string())
    }
}

impl From<ObjectStoreError> for ServiceError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(_) => ServiceError::NotFound,
            other => ServiceError::StorageUnavailable(other.to_string()),
        }
    }
}
