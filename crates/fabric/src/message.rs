//! Typed messages exchanged between router, participants, and coordinators

use chorus_common::{ShardId, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};

/// Phase-1 request: the coordinator asks a participant to prepare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareMsg {
    /// Participant being asked to prepare.
    pub to: ShardId,
    pub txid: TransactionId,
    /// Where the vote must be sent back.
    pub coordinator: ShardId,
}

/// Phase-1 response: a participant reports its prepare timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMsg {
    /// Coordinator shard collecting votes.
    pub to: ShardId,
    pub txid: TransactionId,
    /// Participant that prepared.
    pub from: ShardId,
    pub prepare_ts: Timestamp,
}

/// Instruction to abort a transaction on a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMsg {
    pub to: ShardId,
    pub txid: TransactionId,
}

/// Phase-2 decision, or a direct fast-path commit from the router.
///
/// A `None` commit timestamp means "pick your own next timestamp" and is
/// only valid for unprepared (fast-path) commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMsg {
    pub to: ShardId,
    pub txid: TransactionId,
    pub commit_ts: Option<Timestamp>,
}

/// Router-facing report that a shard committed a transaction.
///
/// The router drains these to learn commit timestamps for its
/// latest-observed read-timestamp policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAck {
    pub from: ShardId,
    pub txid: TransactionId,
    pub commit_ts: Timestamp,
}

/// Why a shard aborted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Local write-vs-write collision.
    WriteConflict,
    /// Crash rolled back unprepared state.
    ShardRestart,
    /// Abort instruction received over the fabric.
    Requested,
    /// Any other shard-local failure.
    Spontaneous,
}

/// Router-facing report that a shard aborted a transaction.
///
/// The router only acts on these at its next dispatch attempt; abort
/// propagation is pull-based on the router side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortNotice {
    pub from: ShardId,
    pub txid: TransactionId,
    pub reason: AbortReason,
}
