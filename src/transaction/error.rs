use thiserror::Error;

use super::lock::TransactionId;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Record {key} is locked by transaction {holder}")]
    Conflict { key: i64, holder: TransactionId },
}

pub type LockResult<T> = Result<T, LockError>;
