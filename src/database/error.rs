use std::io;

use thiserror::Error;

use crate::index::IndexError;
use crate::pool::PoolError;
use crate::query::QueryError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("Buffer pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Key column {key} out of range for {num_columns} columns")]
    InvalidKeyColumn { key: usize, num_columns: usize },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
