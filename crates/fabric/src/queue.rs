//! Per-(shard, transaction) request queues
//!
//! Each queue is strict FIFO and carries at most one outstanding entry at a
//! time: the router may only enqueue when the queue is empty, which models
//! synchronous request/response between router and shard.

use chorus_common::{ShardId, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};

/// Payload of a routed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    Read { key: String },
    Write { key: String },
    /// Hand-off of 2PC orchestration to the designated coordinator shard,
    /// carrying the transaction's full ordered participant list.
    Coordinate { participants: Vec<ShardId> },
}

/// One entry in a shard's request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub txid: TransactionId,
    pub body: RequestBody,
    /// Set on the first statement routed to this shard for this
    /// transaction; the shard starts its local transaction when this
    /// reaches the queue head.
    pub first_statement: bool,
    /// Read timestamp chosen by the router (absent under local read
    /// concern).
    pub read_ts: Option<Timestamp>,
    /// Designated coordinator shard, recorded by the participant at start.
    pub coordinator: ShardId,
}

impl Request {
    /// Key this request touches, if it is a data operation.
    pub fn key(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Read { key } | RequestBody::Write { key } => Some(key),
            RequestBody::Coordinate { .. } => None,
        }
    }
}
