//! Shard participant state machine
//!
//! One record per (shard, transaction):
//! `unstarted → active → [prepared] → committed | aborted`, with abort
//! reachable from any non-terminal state except prepared. Once prepared, a
//! shard's outcome is externally determined by the coordinator's decision.

use std::collections::HashMap;
use std::sync::Arc;

use chorus_common::{HistoryOp, ReadConcern, ShardId, TransactionId};
use chorus_fabric::{
    AbortNotice, AbortReason, CommitAck, CommitMsg, MessageFabric, PrepareMsg, RequestBody,
    VoteMsg,
};
use chorus_storage::{ShardStore, StoreError};

use crate::coordinator::CoordinatorRole;
use crate::error::{Result, ShardError};
use crate::history::GlobalHistory;

/// Lifecycle phase of a transaction on one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPhase {
    Active,
    Prepared,
    Committed,
    Aborted,
}

/// Per-transaction state owned by this shard.
#[derive(Debug)]
struct TxnRecord {
    phase: TxnPhase,
    /// Designated coordinator, fixed at start, never changed.
    coordinator: ShardId,
    /// Local operation history; discarded entirely on abort.
    history: Vec<HistoryOp>,
    /// Present while this shard coordinates the transaction's 2PC.
    coord: Option<CoordinatorRole>,
}

impl TxnRecord {
    fn new(coordinator: ShardId) -> Self {
        Self {
            phase: TxnPhase::Active,
            coordinator,
            history: Vec::new(),
            coord: None,
        }
    }
}

/// A shard participant: owns one storage engine and every transaction
/// record addressed to this shard. All transitions are synchronous; the
/// owning actor serializes them.
pub struct ShardParticipant<S: ShardStore> {
    id: ShardId,
    read_concern: ReadConcern,
    store: S,
    fabric: Arc<MessageFabric>,
    global_history: Arc<GlobalHistory>,
    txns: HashMap<TransactionId, TxnRecord>,
}

impl<S: ShardStore> ShardParticipant<S> {
    pub fn new(
        id: ShardId,
        read_concern: ReadConcern,
        store: S,
        fabric: Arc<MessageFabric>,
        global_history: Arc<GlobalHistory>,
    ) -> Self {
        Self {
            id,
            read_concern,
            store,
            fabric,
            global_history,
            txns: HashMap::new(),
        }
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    pub fn fabric(&self) -> Arc<MessageFabric> {
        self.fabric.clone()
    }

    /// Lifecycle phase of a transaction on this shard, if known.
    pub fn phase(&self, txid: TransactionId) -> Option<TxnPhase> {
        self.txns.get(&txid).map(|r| r.phase)
    }

    /// Whether this shard currently holds the coordinator role for `txid`.
    pub fn is_coordinator(&self, txid: TransactionId) -> bool {
        self.txns
            .get(&txid)
            .map(|r| r.coord.is_some())
            .unwrap_or(false)
    }

    /// Direct access to the storage engine, for inspection in tests and
    /// out-of-band recovery tooling.
    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    /// Process every enabled transition until none remains. Returns the
    /// number of transitions taken.
    pub fn drain(&mut self) -> usize {
        let mut total = 0;
        loop {
            let moved = self.step();
            total += moved;
            if moved == 0 {
                return total;
            }
        }
    }

    /// One pass over queues and message pools. Returns the number of
    /// transitions taken in this pass.
    pub fn step(&mut self) -> usize {
        let mut moved = 0;

        for txid in self.fabric.pending_requests(self.id) {
            if self.process_queue_head(txid) {
                moved += 1;
            }
        }
        while let Some(msg) = self.fabric.take_prepare(self.id) {
            self.handle_prepare(msg);
            moved += 1;
        }
        while let Some(msg) = self.fabric.take_vote(self.id) {
            self.handle_vote(msg);
            moved += 1;
        }
        while let Some(msg) = self.fabric.take_commit(self.id) {
            self.handle_commit(msg);
            moved += 1;
        }
        while let Some(msg) = self.fabric.take_abort(self.id) {
            let _ = self.abort_transaction(msg.txid, AbortReason::Requested);
            moved += 1;
        }

        moved
    }

    /// Attempt to process the head request of one transaction's queue.
    /// Returns false if the head is left unconsumed (empty queue, blocked
    /// read, or a transaction no longer accepting statements).
    fn process_queue_head(&mut self, txid: TransactionId) -> bool {
        let Some(req) = self.fabric.head_request(self.id, txid) else {
            return false;
        };

        if !self.txns.contains_key(&txid) {
            if !req.first_statement {
                // State for this transaction was erased (restart); anything
                // mid-stream is unservable and stays queued until cleared.
                tracing::debug!(shard = %self.id, %txid, "request for unknown transaction");
                return false;
            }
            if self
                .store
                .start_transaction(txid, req.read_ts, self.read_concern)
                .is_err()
            {
                return false;
            }
            self.txns.insert(txid, TxnRecord::new(req.coordinator));
            tracing::debug!(shard = %self.id, %txid, "transaction started");
        }

        match self.txns[&txid].phase {
            TxnPhase::Active => {}
            TxnPhase::Aborted => {
                // The router learns of the abort via its notice; queued work
                // for an aborted transaction is simply dropped.
                self.fabric.clear_queue(self.id, txid);
                return true;
            }
            TxnPhase::Prepared | TxnPhase::Committed => {
                tracing::warn!(shard = %self.id, %txid, "request after prepare; not admitted");
                return false;
            }
        }

        match req.body {
            RequestBody::Read { ref key } => match self.store.read(txid, key) {
                Ok(value) => {
                    self.fabric.pop_request(self.id, txid);
                    self.record_op(
                        txid,
                        HistoryOp::Read {
                            key: key.clone(),
                            value,
                        },
                    );
                    true
                }
                Err(StoreError::PrepareConflict { .. }) => {
                    // Statement not consumed; retried once the blocking
                    // prepare resolves.
                    false
                }
                Err(err) => {
                    tracing::warn!(shard = %self.id, %txid, %err, "read failed; aborting");
                    let _ = self.abort_transaction(txid, AbortReason::Spontaneous);
                    true
                }
            },
            RequestBody::Write { ref key } => {
                let value = txid.to_string();
                match self.store.write(txid, key, &value) {
                    Ok(()) => {
                        self.fabric.pop_request(self.id, txid);
                        self.record_op(
                            txid,
                            HistoryOp::Write {
                                key: key.clone(),
                                value,
                            },
                        );
                        true
                    }
                    Err(StoreError::WriteConflict { .. }) => {
                        let _ = self.abort_transaction(txid, AbortReason::WriteConflict);
                        true
                    }
                    Err(err) => {
                        tracing::warn!(shard = %self.id, %txid, %err, "write failed; aborting");
                        let _ = self.abort_transaction(txid, AbortReason::Spontaneous);
                        true
                    }
                }
            }
            RequestBody::Coordinate { ref participants } => {
                let participants = participants.clone();
                self.fabric.pop_request(self.id, txid);
                if let Err(err) = self.begin_coordination(txid, participants) {
                    tracing::warn!(shard = %self.id, %txid, %err, "coordinate-commit rejected");
                }
                true
            }
        }
    }

    fn record_op(&mut self, txid: TransactionId, op: HistoryOp) {
        if let Some(rec) = self.txns.get_mut(&txid) {
            rec.history.push(op);
        }
    }

    /// Assume the coordinator role: record the participant set and fan out
    /// prepare requests to every participant, this shard included.
    pub fn begin_coordination(
        &mut self,
        txid: TransactionId,
        participants: Vec<ShardId>,
    ) -> Result<()> {
        if participants.first() != Some(&self.id) {
            return Err(ShardError::NotCoordinator(txid.to_string()));
        }
        let rec = self
            .txns
            .get_mut(&txid)
            .ok_or_else(|| ShardError::UnknownTransaction(txid.to_string()))?;
        if rec.phase != TxnPhase::Active {
            return Err(ShardError::AlreadyFinished(txid.to_string()));
        }

        // Any prior vote set is discarded with the old role value.
        rec.coord = Some(CoordinatorRole::new(participants.clone()));
        tracing::debug!(shard = %self.id, %txid, ?participants, "coordinating commit");

        for shard in participants {
            self.fabric.send_prepare(PrepareMsg {
                to: shard,
                txid,
                coordinator: self.id,
            });
        }
        Ok(())
    }

    /// React to a prepare request: obtain a fresh shard-local timestamp,
    /// mark prepared, and vote. Duplicate or late prepares are dropped.
    fn handle_prepare(&mut self, msg: PrepareMsg) {
        let phase = match self.txns.get(&msg.txid) {
            Some(rec) => rec.phase,
            None => {
                tracing::debug!(shard = %self.id, txid = %msg.txid, "prepare for unknown transaction");
                return;
            }
        };
        if phase != TxnPhase::Active {
            tracing::debug!(shard = %self.id, txid = %msg.txid, ?phase, "dropping prepare");
            return;
        }

        let prepare_ts = self.store.next_timestamp();
        if let Err(err) = self.store.prepare(msg.txid, prepare_ts) {
            tracing::warn!(shard = %self.id, txid = %msg.txid, %err, "prepare failed");
            let _ = self.abort_transaction(msg.txid, AbortReason::Spontaneous);
            return;
        }
        if let Some(rec) = self.txns.get_mut(&msg.txid) {
            rec.phase = TxnPhase::Prepared;
        }
        tracing::debug!(shard = %self.id, txid = %msg.txid, %prepare_ts, "prepared");

        self.fabric.send_vote(VoteMsg {
            to: msg.coordinator,
            txid: msg.txid,
            from: self.id,
            prepare_ts,
        });
    }

    /// Accumulate a vote; once every recorded participant has voted, emit
    /// the commit decision at the maximum reported prepare timestamp.
    fn handle_vote(&mut self, msg: VoteMsg) {
        let decision = match self.txns.get_mut(&msg.txid).and_then(|r| r.coord.as_mut()) {
            Some(role) => {
                role.record_vote(msg.from, msg.prepare_ts);
                role.try_decide()
                    .map(|ts| (ts, role.participants().to_vec()))
            }
            None => {
                tracing::debug!(shard = %self.id, txid = %msg.txid, "vote without coordinator role");
                return;
            }
        };

        if let Some((commit_ts, participants)) = decision {
            tracing::debug!(shard = %self.id, txid = %msg.txid, %commit_ts, "commit decided");
            for shard in participants {
                self.fabric.send_commit(CommitMsg {
                    to: shard,
                    txid: msg.txid,
                    commit_ts: Some(commit_ts),
                });
            }
        }
    }

    /// Finalize a transaction on this shard: clear its queue, contribute
    /// its local history to the global history, and commit in storage.
    fn handle_commit(&mut self, msg: CommitMsg) {
        let phase = match self.txns.get(&msg.txid) {
            Some(rec) => rec.phase,
            None => {
                tracing::debug!(shard = %self.id, txid = %msg.txid, "commit for unknown transaction");
                return;
            }
        };
        match phase {
            TxnPhase::Committed => return,
            TxnPhase::Aborted => {
                tracing::warn!(shard = %self.id, txid = %msg.txid, "commit for aborted transaction");
                return;
            }
            TxnPhase::Active | TxnPhase::Prepared => {}
        }

        let committed = if phase == TxnPhase::Prepared {
            match msg.commit_ts {
                Some(ts) => self.store.commit_prepared(msg.txid, ts),
                None => {
                    tracing::warn!(shard = %self.id, txid = %msg.txid, "prepared commit missing timestamp");
                    return;
                }
            }
        } else {
            self.store.commit(msg.txid, msg.commit_ts)
        };

        let commit_ts = match committed {
            Ok(ts) => ts,
            Err(err) => {
                tracing::warn!(shard = %self.id, txid = %msg.txid, %err, "storage commit failed");
                return;
            }
        };

        let ops = match self.txns.get_mut(&msg.txid) {
            Some(rec) => {
                rec.phase = TxnPhase::Committed;
                rec.coord = None;
                std::mem::take(&mut rec.history)
            }
            None => Vec::new(),
        };
        self.fabric.clear_queue(self.id, msg.txid);
        self.global_history.append(msg.txid, ops);
        self.fabric.send_commit_ack(CommitAck {
            from: self.id,
            txid: msg.txid,
            commit_ts,
        });
        tracing::debug!(shard = %self.id, txid = %msg.txid, %commit_ts, "committed");
    }

    /// Abort a transaction on this shard. Only active (unprepared)
    /// transactions may abort unilaterally; local history is discarded and
    /// never reaches the global history.
    pub fn abort_transaction(&mut self, txid: TransactionId, reason: AbortReason) -> Result<()> {
        let rec = self
            .txns
            .get_mut(&txid)
            .ok_or_else(|| ShardError::UnknownTransaction(txid.to_string()))?;
        match rec.phase {
            TxnPhase::Active => {}
            TxnPhase::Prepared => return Err(ShardError::AlreadyPrepared(txid.to_string())),
            TxnPhase::Committed | TxnPhase::Aborted => {
                return Err(ShardError::AlreadyFinished(txid.to_string()))
            }
        }

        rec.phase = TxnPhase::Aborted;
        rec.history.clear();
        rec.coord = None;
        let _ = self.store.abort(txid);
        self.fabric.clear_queue(self.id, txid);
        self.fabric.send_abort_notice(AbortNotice {
            from: self.id,
            txid,
            reason,
        });
        tracing::debug!(shard = %self.id, %txid, ?reason, "aborted");
        Ok(())
    }

    /// Model a shard crash: every queued-but-unprocessed request and all
    /// coordinator/vote state is erased, and every transaction that was
    /// active but not yet prepared is rolled back. Prepared transactions
    /// are presumed durably logged and retained, pending the coordinator's
    /// decision.
    pub fn restart(&mut self) {
        tracing::warn!(shard = %self.id, "restarting");
        self.fabric.clear_shard(self.id);

        let txids: Vec<TransactionId> = self.txns.keys().copied().collect();
        for txid in txids {
            let phase = self.txns[&txid].phase;
            match phase {
                TxnPhase::Active => {
                    let _ = self.store.abort(txid);
                    self.txns.remove(&txid);
                    self.fabric.send_abort_notice(AbortNotice {
                        from: self.id,
                        txid,
                        reason: AbortReason::ShardRestart,
                    });
                }
                TxnPhase::Prepared | TxnPhase::Committed | TxnPhase::Aborted => {
                    if let Some(rec) = self.txns.get_mut(&txid) {
                        rec.coord = None;
                    }
                }
            }
        }
    }
}
