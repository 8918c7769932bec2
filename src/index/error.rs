use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Key {value} not found in index on column {column}")]
    KeyNotFound { column: usize, value: i64 },

    #[error("Column {0} is not indexed")]
    NotIndexed(usize),

    #[error("Column {0} is already indexed")]
    AlreadyIndexed(usize),

    #[error("Column {0} does not exist")]
    InvalidColumn(usize),

    #[error("Record has {actual} columns, index expects {expected}")]
    SchemaMismatch { expected: usize, actual: usize },
}

pub type IndexResult<T> = Result<T, IndexError>;
