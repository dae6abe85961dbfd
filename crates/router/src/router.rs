//! Per-transaction router lifecycle
//!
//! The router owns one record per transaction: the chosen read timestamp,
//! the join-ordered participant list with the operation kinds seen on each
//! shard, and a monotonic in-commit flag. The first shard to join is
//! permanently the transaction's designated coordinator.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chorus_common::{OpKind, ReadConcern, ShardId, Timestamp, TransactionId};
use chorus_fabric::{AbortMsg, CommitMsg, MessageFabric, Request, RequestBody};

use crate::catalog::Catalog;
use crate::error::{Result, RouterError};

/// How the router picks a read timestamp when the caller supplies none.
///
/// The reference behavior is an unconstrained choice from the observable
/// history; a deterministic policy replaces it so conformance tests can
/// sweep the space instead of relying on non-determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    /// Latest commit timestamp observed in commit acknowledgments.
    LatestObserved,
    /// Always the given timestamp.
    Fixed(Timestamp),
}

/// Router-side view of a transaction's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Not known to this router.
    Unknown,
    /// Started and still accepting operations.
    Open,
    /// A commit strategy has fired.
    InCommit,
    /// At least one participant reported an abort.
    Aborted,
}

/// The commit strategy selected for a transaction, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// Exactly one participant: direct commit, no 2PC.
    SingleShard,
    /// Multiple participants, all read-only: direct commits everywhere.
    ReadOnly,
    /// Exactly one participant holds writes: direct commits everywhere.
    SingleWriteShard,
    /// Two or more write shards: hand off to the coordinator for full 2PC.
    TwoPhase,
}

/// Router-side record for one transaction.
#[derive(Debug)]
struct TxnRecord {
    op_count: u32,
    /// Chosen read timestamp; `None` is the "no fixed snapshot" sentinel
    /// used under local read concern.
    read_ts: Option<Timestamp>,
    /// Monotonic: set when any commit strategy fires, never reset.
    in_commit: bool,
    /// (shard, op kinds seen there) in shard-join order; index 0 is the
    /// designated coordinator.
    participants: Vec<(ShardId, BTreeSet<OpKind>)>,
    /// Shards that reported aborting this transaction.
    aborted: BTreeSet<ShardId>,
}

/// Translates client transaction operations into shard dispatches and
/// selects a commit strategy.
pub struct Router {
    read_concern: ReadConcern,
    policy: TimestampPolicy,
    catalog: Catalog,
    fabric: Arc<MessageFabric>,
    txns: HashMap<TransactionId, TxnRecord>,
    latest_observed: Timestamp,
}

impl Router {
    pub fn new(
        read_concern: ReadConcern,
        policy: TimestampPolicy,
        catalog: Catalog,
        fabric: Arc<MessageFabric>,
    ) -> Self {
        Self {
            read_concern,
            policy,
            catalog,
            fabric,
            txns: HashMap::new(),
            latest_observed: Timestamp::ZERO,
        }
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Highest commit timestamp observed so far.
    pub fn latest_observed(&self) -> Timestamp {
        self.latest_observed
    }

    /// Drain commit acknowledgments and abort notices from the fabric.
    /// Called before every dispatch; may also be called explicitly.
    pub fn observe_notices(&mut self) {
        for ack in self.fabric.drain_commit_acks() {
            if ack.commit_ts > self.latest_observed {
                self.latest_observed = ack.commit_ts;
            }
        }
        for notice in self.fabric.drain_abort_notices() {
            tracing::debug!(txid = %notice.txid, shard = %notice.from, reason = ?notice.reason,
                "participant aborted");
            if let Some(rec) = self.txns.get_mut(&notice.txid) {
                rec.aborted.insert(notice.from);
            }
        }
    }

    /// Begin tracking a transaction. Under snapshot read concern the read
    /// timestamp is the candidate if given, otherwise the policy's pick;
    /// under local read concern no snapshot is fixed. No-op if the
    /// transaction is already started.
    pub fn start_transaction(&mut self, txid: TransactionId, candidate: Option<Timestamp>) {
        if self.txns.contains_key(&txid) {
            return;
        }
        self.observe_notices();
        let read_ts = match self.read_concern {
            ReadConcern::Snapshot => Some(candidate.unwrap_or(match self.policy {
                TimestampPolicy::LatestObserved => self.latest_observed,
                TimestampPolicy::Fixed(ts) => ts,
            })),
            ReadConcern::Local => None,
        };
        self.txns.insert(
            txid,
            TxnRecord {
                op_count: 0,
                read_ts,
                in_commit: false,
                participants: Vec::new(),
                aborted: BTreeSet::new(),
            },
        );
        tracing::debug!(%txid, ?read_ts, "transaction started");
    }

    /// Dispatch one client operation to the shard owning `key`.
    pub fn route_operation(
        &mut self,
        txid: TransactionId,
        key: &str,
        kind: OpKind,
    ) -> Result<()> {
        self.observe_notices();

        let shard = self
            .catalog
            .lookup(key)
            .ok_or_else(|| RouterError::NoOwningShard(key.to_string()))?;

        let rec = self
            .txns
            .get_mut(&txid)
            .ok_or_else(|| RouterError::NotStarted(txid.to_string()))?;
        if rec.in_commit {
            return Err(RouterError::CommitInProgress(txid.to_string()));
        }
        if let Some(&offender) = rec.aborted.iter().next() {
            broadcast_abort(&self.fabric, txid, &rec.participants, &rec.aborted);
            return Err(RouterError::ParticipantAborted {
                txid: txid.to_string(),
                shard: offender.to_string(),
            });
        }

        // Backpressure: one outstanding request per (shard, txid).
        if !self.fabric.queue_is_empty(shard, txid) {
            return Err(RouterError::ShardBusy {
                txid: txid.to_string(),
                shard: shard.to_string(),
            });
        }

        let first = !rec.participants.iter().any(|(s, _)| *s == shard);
        if first {
            rec.participants.push((shard, BTreeSet::new()));
        }
        if let Some((_, kinds)) = rec.participants.iter_mut().find(|(s, _)| *s == shard) {
            kinds.insert(kind);
        }
        rec.op_count += 1;
        let coordinator = rec.participants[0].0;
        let read_ts = rec.read_ts;

        let body = match kind {
            OpKind::Read => RequestBody::Read {
                key: key.to_string(),
            },
            OpKind::Write => RequestBody::Write {
                key: key.to_string(),
            },
        };
        // Queue emptiness was checked above; this cannot report busy.
        self.fabric
            .enqueue_request(
                shard,
                Request {
                    txid,
                    body,
                    first_statement: first,
                    read_ts,
                    coordinator,
                },
            )
            .map_err(RouterError::from)
    }

    /// Choose and fire exactly one commit strategy for the transaction.
    pub fn commit_transaction(&mut self, txid: TransactionId) -> Result<CommitStrategy> {
        self.observe_notices();

        let rec = self
            .txns
            .get_mut(&txid)
            .ok_or_else(|| RouterError::NotStarted(txid.to_string()))?;
        if rec.in_commit {
            return Err(RouterError::CommitInProgress(txid.to_string()));
        }
        if let Some(&offender) = rec.aborted.iter().next() {
            broadcast_abort(&self.fabric, txid, &rec.participants, &rec.aborted);
            return Err(RouterError::ParticipantAborted {
                txid: txid.to_string(),
                shard: offender.to_string(),
            });
        }
        if rec.participants.is_empty() {
            return Err(RouterError::NoParticipants(txid.to_string()));
        }

        let write_shards = rec
            .participants
            .iter()
            .filter(|(_, kinds)| kinds.contains(&OpKind::Write))
            .count();
        let strategy = if rec.participants.len() == 1 {
            CommitStrategy::SingleShard
        } else if write_shards == 0 {
            CommitStrategy::ReadOnly
        } else if write_shards == 1 {
            CommitStrategy::SingleWriteShard
        } else {
            CommitStrategy::TwoPhase
        };

        let coordinator = rec.participants[0].0;
        let targets: Vec<ShardId> = match strategy {
            CommitStrategy::TwoPhase => vec![coordinator],
            _ => rec.participants.iter().map(|(s, _)| *s).collect(),
        };
        for &shard in &targets {
            if !self.fabric.queue_is_empty(shard, txid) {
                return Err(RouterError::ShardBusy {
                    txid: txid.to_string(),
                    shard: shard.to_string(),
                });
            }
        }

        match strategy {
            CommitStrategy::TwoPhase => {
                let participants: Vec<ShardId> =
                    rec.participants.iter().map(|(s, _)| *s).collect();
                let read_ts = rec.read_ts;
                rec.in_commit = true;
                self.fabric
                    .enqueue_request(
                        coordinator,
                        Request {
                            txid,
                            body: RequestBody::Coordinate { participants },
                            first_statement: false,
                            read_ts,
                            coordinator,
                        },
                    )
                    .map_err(RouterError::from)?;
            }
            _ => {
                // Direct commits: commit timestamp left unset, each shard
                // picks its own next timestamp.
                rec.in_commit = true;
                for shard in targets {
                    self.fabric.send_commit(CommitMsg {
                        to: shard,
                        txid,
                        commit_ts: None,
                    });
                }
            }
        }

        tracing::debug!(%txid, ?strategy, "commit initiated");
        Ok(strategy)
    }

    /// The read timestamp chosen for a transaction (`Some(None)` means the
    /// transaction runs without a fixed snapshot).
    pub fn read_timestamp(&self, txid: TransactionId) -> Option<Option<Timestamp>> {
        self.txns.get(&txid).map(|r| r.read_ts)
    }

    /// Join-ordered participant list with the op kinds seen on each shard.
    pub fn participants(&self, txid: TransactionId) -> Vec<(ShardId, BTreeSet<OpKind>)> {
        self.txns
            .get(&txid)
            .map(|r| r.participants.clone())
            .unwrap_or_default()
    }

    /// Whether a commit strategy has fired for the transaction.
    pub fn is_in_commit(&self, txid: TransactionId) -> bool {
        self.txns.get(&txid).map(|r| r.in_commit).unwrap_or(false)
    }

    /// Progress of a transaction as seen from this router. Aborts reported
    /// by participants take precedence over the in-commit flag.
    pub fn transaction_state(&self, txid: TransactionId) -> TransactionState {
        match self.txns.get(&txid) {
            None => TransactionState::Unknown,
            Some(rec) if !rec.aborted.is_empty() => TransactionState::Aborted,
            Some(rec) if rec.in_commit => TransactionState::InCommit,
            Some(_) => TransactionState::Open,
        }
    }
}

/// Proactively tell every engaged, non-aborted participant to abort.
///
/// The reference protocol leaves cross-shard abort propagation to timeout
/// recovery; this implementation opts for prompt cleanup instead.
fn broadcast_abort(
    fabric: &MessageFabric,
    txid: TransactionId,
    participants: &[(ShardId, BTreeSet<OpKind>)],
    already_aborted: &BTreeSet<ShardId>,
) {
    for (shard, _) in participants {
        if !already_aborted.contains(shard) {
            fabric.send_abort(AbortMsg { to: *shard, txid });
        }
    }
}
