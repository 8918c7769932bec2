use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Capacity exceeded: slot {0} is outside the allocated record range")]
    CapacityExceeded(usize),

    #[error("Slot out of range: slot={slot}, num_records={num_records}")]
    OutOfRange { slot: usize, num_records: usize },

    #[error("Schema mismatch: expected {expected} columns, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Corrupt page data: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
