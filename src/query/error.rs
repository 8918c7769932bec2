use thiserror::Error;

use crate::index::IndexError;
use crate::pool::PoolError;
use crate::storage::{Rid, StorageError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Buffer pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Schema mismatch: expected {expected} columns, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Duplicate primary key {0}")]
    DuplicateKey(i64),

    #[error("No record for RID {0}")]
    NotFound(Rid),

    #[error("No matching records for key {0}")]
    NoSuchKey(i64),

    #[error("No records with keys in [{start}, {end}]")]
    EmptyRange { start: i64, end: i64 },

    #[error("Primary key cannot be changed by an update")]
    PrimaryKeyImmutable,
}

pub type QueryResult<T> = Result<T, QueryError>;
