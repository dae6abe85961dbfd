//! Error types for shard-side operations

use thiserror::Error;

/// Result type for shard operations
pub type Result<T> = std::result::Result<T, ShardError>;

/// Errors surfaced by the shard participant's public API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShardError {
    #[error("Transaction not found on this shard: {0}")]
    UnknownTransaction(String),

    #[error("Transaction {0} is prepared; its outcome is decided by the coordinator")]
    AlreadyPrepared(String),

    #[error("Transaction {0} is already finished")]
    AlreadyFinished(String),

    #[error("Shard is not the designated coordinator for transaction {0}")]
    NotCoordinator(String),
}
