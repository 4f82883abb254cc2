use patchwork_core::error::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SledError {
    #[error("Storage error: {0}")]
    StorageError(#[from] sled::Error),
    #[error("Bincode error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("Blocking task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] std::string::FromUtf8Error),
}

impl From<SledError> for RepositoryError {
    fn from(err: SledError) -> Self {
        match err {
            SledError::BincodeError(e) => RepositoryError::SerializationError(e),
            other => RepositoryError::BackendError(Box::new(other)),
        }
    }
}
