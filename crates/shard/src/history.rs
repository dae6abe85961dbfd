//! Global committed-operation history
//!
//! Append-only record of committed transactions' operations, populated
//! only as shards commit. A shard that aborts a transaction contributes
//! nothing. This is the sole output consumed by external isolation
//! checking.

use std::collections::HashMap;

use chorus_common::{HistoryOp, TransactionId};
use parking_lot::Mutex;

/// Shared, append-only global operation history.
#[derive(Debug, Default)]
pub struct GlobalHistory {
    inner: Mutex<HashMap<TransactionId, Vec<HistoryOp>>>,
}

impl GlobalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one shard's local history slice for a committed transaction.
    /// Cross-shard order within a transaction is shard-commit order.
    pub fn append(&self, txid: TransactionId, ops: Vec<HistoryOp>) {
        self.inner.lock().entry(txid).or_default().extend(ops);
    }

    /// The full recorded history for a transaction, if any shard committed it.
    pub fn get(&self, txid: TransactionId) -> Option<Vec<HistoryOp>> {
        self.inner.lock().get(&txid).cloned()
    }

    /// Transactions with at least one committed contribution.
    pub fn transactions(&self) -> Vec<TransactionId> {
        self.inner.lock().keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_shard_commit_order() {
        let history = GlobalHistory::new();
        let txid = TransactionId::new();

        history.append(
            txid,
            vec![HistoryOp::Write {
                key: "k1".to_string(),
                value: "v1".to_string(),
            }],
        );
        history.append(
            txid,
            vec![HistoryOp::Read {
                key: "k2".to_string(),
                value: None,
            }],
        );

        let ops = history.get(txid).unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops[0].is_write());
        assert_eq!(ops[1].key(), "k2");
    }

    #[test]
    fn test_missing_transaction_has_no_history() {
        let history = GlobalHistory::new();
        assert!(history.get(TransactionId::new()).is_none());
        assert!(history.is_empty());
    }
}
