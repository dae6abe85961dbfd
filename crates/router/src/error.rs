//! Error types for the router

use thiserror::Error;

/// Result type for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Router error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Transaction not started: {0}")]
    NotStarted(String),

    #[error("No shard owns key: {0}")]
    NoOwningShard(String),

    #[error("Participant {shard} aborted transaction {txid}")]
    ParticipantAborted { txid: String, shard: String },

    #[error("Commit already initiated for transaction {0}")]
    CommitInProgress(String),

    #[error("Transaction {0} touched no shards")]
    NoParticipants(String),

    #[error("Shard {shard} busy; previous request for transaction {txid} still outstanding")]
    ShardBusy { txid: String, shard: String },
}

impl From<chorus_fabric::FabricError> for RouterError {
    fn from(err: chorus_fabric::FabricError) -> Self {
        match err {
            chorus_fabric::FabricError::QueueBusy { shard, txid } => {
                RouterError::ShardBusy { txid, shard }
            }
        }
    }
}
