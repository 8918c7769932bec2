use std::io;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupt frame: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Corrupt(format!("malformed range metadata: {}", err))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
