//! In-memory messaging fabric for the chorus transaction core
//!
//! This crate carries everything that moves between actors: the four
//! independent, unordered 2PC message pools (prepare, vote, abort, commit),
//! the router-facing acknowledgment pools, and the per-(shard, transaction)
//! FIFO request queues with single-outstanding-entry backpressure.
//!
//! Pools are unordered with atomic exactly-once take semantics: a message
//! is removed from its pool in the same step that reacts to it, and no
//! ordering is guaranteed across message kinds or target shards.

mod message;
mod pools;
mod queue;

use thiserror::Error;

pub use message::{
    AbortMsg, AbortNotice, AbortReason, CommitAck, CommitMsg, PrepareMsg, VoteMsg,
};
pub use pools::MessageFabric;
pub use queue::{Request, RequestBody};

/// Fabric errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FabricError {
    #[error("Request queue busy for shard {shard} transaction {txid}")]
    QueueBusy { shard: String, txid: String },
}

pub type Result<T> = std::result::Result<T, FabricError>;
