//! In-memory multi-version store
//!
//! Provides transaction isolation through versioning of key-value pairs:
//! reads resolve against a snapshot timestamp, writes stay buffered in the
//! transaction until commit, and prepare pins a transaction's write set
//! durable-pending until the coordinator's decision arrives.

use std::collections::HashMap;

use chorus_common::{ReadConcern, Timestamp, TransactionId};

use crate::error::{Result, StoreError, StoreStatus};
use crate::store::{ShardStore, StoreConfig};

/// A committed version of a key.
#[derive(Debug, Clone)]
struct Version {
    value: String,
    commit_ts: Timestamp,
}

/// Bookkeeping for one in-progress transaction.
#[derive(Debug, Default)]
struct TxnState {
    /// Fixed snapshot timestamp, absent under local read concern.
    read_ts: Option<Timestamp>,
    /// Buffered writes in submission order.
    writes: Vec<(String, String)>,
    /// Prepare timestamp once the transaction is durable-pending.
    prepared: Option<Timestamp>,
}

/// In-memory [`ShardStore`] implementation.
#[derive(Debug)]
pub struct MemoryStore {
    /// Committed versions per key, ascending by commit timestamp.
    versions: HashMap<String, Vec<Version>>,

    /// In-progress transactions.
    txns: HashMap<TransactionId, TxnState>,

    /// Logical clock; every issued or applied timestamp moves it forward.
    clock: u64,

    /// Outcome class of the most recent operation per transaction.
    statuses: HashMap<TransactionId, StoreStatus>,

    config: StoreConfig,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            versions: HashMap::new(),
            txns: HashMap::new(),
            clock: 0,
            statuses: HashMap::new(),
            config,
        }
    }

    /// The value a transaction at `read_ts` observes for `key`, ignoring
    /// any of its own buffered writes.
    fn committed_value(&self, key: &str, read_ts: Option<Timestamp>) -> Option<String> {
        let versions = self.versions.get(key)?;
        match read_ts {
            Some(ts) => versions
                .iter()
                .rev()
                .find(|v| v.commit_ts <= ts)
                .map(|v| v.value.clone()),
            None => versions.last().map(|v| v.value.clone()),
        }
    }

    /// Whether another transaction holds a pending prepare covering `key`.
    fn prepare_blocks(&self, txid: TransactionId, key: &str) -> bool {
        self.txns.iter().any(|(other, state)| {
            *other != txid && state.prepared.is_some() && state.writes.iter().any(|(k, _)| k == key)
        })
    }

    /// Whether another in-progress transaction has buffered a write to `key`.
    fn conflicting_writer(&self, txid: TransactionId, key: &str) -> bool {
        self.txns.iter().any(|(other, state)| {
            *other != txid && state.writes.iter().any(|(k, _)| k == key)
        })
    }

    fn record_fail(&mut self, txid: TransactionId, err: StoreError) -> StoreError {
        self.statuses.insert(txid, StoreStatus::from(&err));
        err
    }

    fn apply_writes(&mut self, state: TxnState, commit_ts: Timestamp) {
        for (key, value) in state.writes {
            self.versions
                .entry(key)
                .or_default()
                .push(Version { value, commit_ts });
        }
        self.clock = self.clock.max(commit_ts.0);
    }
}

impl ShardStore for MemoryStore {
    fn start_transaction(
        &mut self,
        txid: TransactionId,
        read_ts: Option<Timestamp>,
        read_concern: ReadConcern,
    ) -> Result<()> {
        if self.txns.contains_key(&txid) {
            return Ok(());
        }
        let read_ts = match read_concern {
            ReadConcern::Snapshot => read_ts,
            ReadConcern::Local => None,
        };
        self.txns.insert(
            txid,
            TxnState {
                read_ts,
                ..TxnState::default()
            },
        );
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(())
    }

    fn read(&mut self, txid: TransactionId, key: &str) -> Result<Option<String>> {
        let state = self
            .txns
            .get(&txid)
            .ok_or_else(|| StoreError::TransactionNotFound(txid.to_string()))?;

        if self.config.prepare_blocking && self.prepare_blocks(txid, key) {
            let err = StoreError::PrepareConflict {
                key: key.to_string(),
            };
            return Err(self.record_fail(txid, err));
        }

        // Read-your-writes: the latest buffered write wins over the snapshot.
        if let Some((_, value)) = state.writes.iter().rev().find(|(k, _)| k == key) {
            let value = value.clone();
            self.statuses.insert(txid, StoreStatus::Ok);
            return Ok(Some(value));
        }

        let value = self.committed_value(key, state.read_ts);
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(value)
    }

    fn write(&mut self, txid: TransactionId, key: &str, value: &str) -> Result<()> {
        let state = self
            .txns
            .get(&txid)
            .ok_or_else(|| StoreError::TransactionNotFound(txid.to_string()))?;
        if state.prepared.is_some() {
            return Err(StoreError::InvalidState(format!(
                "transaction {} already prepared",
                txid
            )));
        }

        if self.config.detect_write_conflicts && self.conflicting_writer(txid, key) {
            let err = StoreError::WriteConflict {
                key: key.to_string(),
            };
            return Err(self.record_fail(txid, err));
        }

        let state = self.txns.get_mut(&txid).unwrap();
        state.writes.push((key.to_string(), value.to_string()));
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(())
    }

    fn prepare(&mut self, txid: TransactionId, prepare_ts: Timestamp) -> Result<()> {
        let state = self
            .txns
            .get_mut(&txid)
            .ok_or_else(|| StoreError::TransactionNotFound(txid.to_string()))?;
        if state.prepared.is_some() {
            return Err(StoreError::InvalidState(format!(
                "transaction {} already prepared",
                txid
            )));
        }
        state.prepared = Some(prepare_ts);
        self.clock = self.clock.max(prepare_ts.0);
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(())
    }

    fn commit(&mut self, txid: TransactionId, commit_ts: Option<Timestamp>) -> Result<Timestamp> {
        let state = self
            .txns
            .remove(&txid)
            .ok_or_else(|| StoreError::TransactionNotFound(txid.to_string()))?;
        if state.prepared.is_some() {
            self.txns.insert(txid, state);
            return Err(StoreError::InvalidState(format!(
                "transaction {} is prepared; use commit_prepared",
                txid
            )));
        }
        let ts = commit_ts.unwrap_or_else(|| self.next_timestamp());
        self.apply_writes(state, ts);
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(ts)
    }

    fn commit_prepared(&mut self, txid: TransactionId, commit_ts: Timestamp) -> Result<Timestamp> {
        let state = self
            .txns
            .remove(&txid)
            .ok_or_else(|| StoreError::TransactionNotFound(txid.to_string()))?;
        if state.prepared.is_none() {
            self.txns.insert(txid, state);
            return Err(StoreError::InvalidState(format!(
                "transaction {} is not prepared",
                txid
            )));
        }
        self.apply_writes(state, commit_ts);
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(commit_ts)
    }

    fn abort(&mut self, txid: TransactionId) -> Result<()> {
        // Buffered and prepared state simply disappears with the record.
        self.txns.remove(&txid);
        self.statuses.insert(txid, StoreStatus::Ok);
        Ok(())
    }

    fn next_timestamp(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp(self.clock)
    }

    fn status(&self, txid: TransactionId) -> StoreStatus {
        self.statuses.get(&txid).copied().unwrap_or(StoreStatus::Ok)
    }

    fn is_active(&self, txid: TransactionId) -> bool {
        self.txns.contains_key(&txid)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
