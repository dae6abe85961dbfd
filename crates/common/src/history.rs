//! Committed-operation history entries
//!
//! The global operation history maps each committed transaction to the
//! ordered sequence of reads and writes it performed. Shards contribute
//! their local slice at the moment they commit, so a transaction's
//! cross-shard order is shard-commit order, not wall-clock order.

use serde::{Deserialize, Serialize};

/// A single read or write as recorded in a transaction's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryOp {
    /// A read of `key` that observed `value` (`None` for a missing key).
    Read { key: String, value: Option<String> },
    /// A write of `value` to `key`.
    Write { key: String, value: String },
}

impl HistoryOp {
    /// The key this operation touched.
    pub fn key(&self) -> &str {
        match self {
            HistoryOp::Read { key, .. } => key,
            HistoryOp::Write { key, .. } => key,
        }
    }

    /// Whether this entry is a write.
    pub fn is_write(&self) -> bool {
        matches!(self, HistoryOp::Write { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_op_accessors() {
        let read = HistoryOp::Read {
            key: "k1".to_string(),
            value: None,
        };
        let write = HistoryOp::Write {
            key: "k2".to_string(),
            value: "v".to_string(),
        };
        assert_eq!(read.key(), "k1");
        assert!(!read.is_write());
        assert!(write.is_write());
    }
}
