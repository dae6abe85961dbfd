//! Error types for the storage interface

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors a storage engine can report to the coordination core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Write conflict on key {key}")]
    WriteConflict { key: String },

    #[error("Read of key {key} blocked by in-progress prepare")]
    PrepareConflict { key: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Transaction in invalid state: {0}")]
    InvalidState(String),
}

/// Outcome class of the most recent operation on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Ok,
    WriteConflict,
    PrepareConflict,
}

impl From<&StoreError> for StoreStatus {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::WriteConflict { .. } => StoreStatus::WriteConflict,
            StoreError::PrepareConflict { .. } => StoreStatus::PrepareConflict,
            _ => StoreStatus::Ok,
        }
    }
}
