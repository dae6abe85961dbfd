//! Storage interface the coordination core drives
//!
//! All methods are synchronous: a shard processes its request queue one
//! entry at a time, and each entry must be fully applied before the next
//! one is looked at.

use chorus_common::{ReadConcern, Timestamp, TransactionId};

use crate::error::{Result, StoreStatus};

/// Behavior toggles for the storage engine.
///
/// Both toggles exist for conformance and fault-injection testing, not for
/// production use.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// When set, a read that lands on a key with an in-progress prepare
    /// fails with `PrepareConflict` instead of reading around it.
    pub prepare_blocking: bool,

    /// When set, a write that collides with another in-progress writer on
    /// the same key fails with `WriteConflict`.
    pub detect_write_conflicts: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prepare_blocking: true,
            detect_write_conflicts: true,
        }
    }
}

/// Per-shard multi-version storage engine, keyed by logical timestamps.
///
/// One instance is exclusively owned by its shard; other shards reach it
/// only through explicit messages, never shared memory.
pub trait ShardStore: Send {
    /// Establish a transaction's read snapshot. Idempotent no-op if the
    /// transaction is already started. `read_ts` is honored only under
    /// snapshot read concern.
    fn start_transaction(
        &mut self,
        txid: TransactionId,
        read_ts: Option<Timestamp>,
        read_concern: ReadConcern,
    ) -> Result<()>;

    /// Read `key` from the transaction's snapshot.
    ///
    /// Fails with `PrepareConflict` if blocked by an in-progress prepare on
    /// that key (unless prepare-blocking is disabled).
    fn read(&mut self, txid: TransactionId, key: &str) -> Result<Option<String>>;

    /// Buffer a write under the transaction.
    ///
    /// Fails with `WriteConflict` if a conflicting concurrent writer exists
    /// (unless conflict detection is disabled).
    fn write(&mut self, txid: TransactionId, key: &str, value: &str) -> Result<()>;

    /// Make the transaction's writes durable-pending at `prepare_ts`.
    /// Irreversible except by explicit abort before this call.
    fn prepare(&mut self, txid: TransactionId, prepare_ts: Timestamp) -> Result<()>;

    /// Finalize visibility of an unprepared transaction. A `None` commit
    /// timestamp means "pick this shard's own next timestamp". Returns the
    /// timestamp the commit was applied at.
    fn commit(&mut self, txid: TransactionId, commit_ts: Option<Timestamp>) -> Result<Timestamp>;

    /// Finalize visibility of a prepared transaction at the timestamp the
    /// coordinator agreed on.
    fn commit_prepared(&mut self, txid: TransactionId, commit_ts: Timestamp) -> Result<Timestamp>;

    /// Discard all buffered and prepared state for the transaction.
    fn abort(&mut self, txid: TransactionId) -> Result<()>;

    /// Return a strictly increasing, shard-local logical timestamp.
    fn next_timestamp(&mut self) -> Timestamp;

    /// Outcome class of the most recent operation on `txid`.
    fn status(&self, txid: TransactionId) -> StoreStatus;

    /// Whether the transaction is currently started and neither committed
    /// nor aborted.
    fn is_active(&self, txid: TransactionId) -> bool;
}
