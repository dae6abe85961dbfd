//! Common types for the chorus transaction core
//!
//! This crate defines:
//! - Transaction IDs (UUIDv7-based)
//! - Shard identifiers and logical timestamps
//! - Operation kinds and committed-history entries
//! - The read-concern configuration shared by router and shards

mod history;
mod id;
mod timestamp;

pub use history::HistoryOp;
pub use id::{ShardId, TransactionId};
pub use timestamp::Timestamp;

use serde::{Deserialize, Serialize};

/// Kind of a routed client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Read operation - does not modify state
    Read,
    /// Write operation - modifies state
    Write,
}

/// Read concern governing snapshot selection.
///
/// Under `Local` the router never fixes a snapshot timestamp; each shard
/// reads whatever is locally committed. Under `Snapshot` the router's chosen
/// read timestamp is honored by every shard the transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadConcern {
    Local,
    Snapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_ordering() {
        // BTreeSet<OpKind> relies on a stable order.
        assert!(OpKind::Read < OpKind::Write);
    }

    #[test]
    fn test_read_concern_serde() {
        let json = serde_json::to_string(&ReadConcern::Snapshot).unwrap();
        let back: ReadConcern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ReadConcern::Snapshot);
    }
}
