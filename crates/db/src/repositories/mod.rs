use thiserror::Error;

use staffflow_core::store::StoreError;

pub mod memory;
pub mod workflow;

pub use memory::InMemoryWorkflowStore;
pub use workflow::SqlWorkflowStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("service request {request_id} is at version {actual:?}, expected {expected:?}")]
    VersionConflict { request_id: String, expected: Option<u64>, actual: Option<u64> },
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionConflict { request_id, expected, actual } => {
                StoreError::VersionConflict { request_id, expected, actual }
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}
