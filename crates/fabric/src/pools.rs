//! Message pools and request queues shared by all actors

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chorus_common::{ShardId, TransactionId};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::message::{AbortMsg, AbortNotice, CommitAck, CommitMsg, PrepareMsg, VoteMsg};
use crate::queue::Request;
use crate::{FabricError, Result};

/// The messaging fabric: four unordered 2PC pools, two router-facing
/// acknowledgment pools, and the per-(shard, txid) request queues.
///
/// Every mutation is a single lock-guarded step, so message consumption is
/// atomic with the transition that reacts to it (exactly-once), and a
/// duplicate delivery can only come from a duplicate send.
pub struct MessageFabric {
    prepares: Mutex<Vec<PrepareMsg>>,
    votes: Mutex<Vec<VoteMsg>>,
    aborts: Mutex<Vec<AbortMsg>>,
    commits: Mutex<Vec<CommitMsg>>,

    commit_acks: Mutex<Vec<CommitAck>>,
    abort_notices: Mutex<Vec<AbortNotice>>,

    queues: Mutex<HashMap<(ShardId, TransactionId), VecDeque<Request>>>,

    /// Per-shard wakeups for actor loops.
    wakeups: Mutex<HashMap<ShardId, Arc<Notify>>>,
}

impl MessageFabric {
    pub fn new() -> Self {
        Self {
            prepares: Mutex::new(Vec::new()),
            votes: Mutex::new(Vec::new()),
            aborts: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            commit_acks: Mutex::new(Vec::new()),
            abort_notices: Mutex::new(Vec::new()),
            queues: Mutex::new(HashMap::new()),
            wakeups: Mutex::new(HashMap::new()),
        }
    }

    /// Wakeup handle for a shard's actor loop. Signaled whenever a message
    /// or request targeting that shard arrives.
    pub fn wakeup(&self, shard: ShardId) -> Arc<Notify> {
        self.wakeups.lock().entry(shard).or_default().clone()
    }

    fn notify(&self, shard: ShardId) {
        if let Some(n) = self.wakeups.lock().get(&shard) {
            n.notify_one();
        }
    }

    // --- 2PC pools ---

    pub fn send_prepare(&self, msg: PrepareMsg) {
        let to = msg.to;
        self.prepares.lock().push(msg);
        self.notify(to);
    }

    /// Atomically remove and return one prepare message addressed to `shard`.
    pub fn take_prepare(&self, shard: ShardId) -> Option<PrepareMsg> {
        take_matching(&self.prepares, |m| m.to == shard)
    }

    pub fn send_vote(&self, msg: VoteMsg) {
        let to = msg.to;
        self.votes.lock().push(msg);
        self.notify(to);
    }

    pub fn take_vote(&self, shard: ShardId) -> Option<VoteMsg> {
        take_matching(&self.votes, |m| m.to == shard)
    }

    pub fn send_abort(&self, msg: AbortMsg) {
        let to = msg.to;
        self.aborts.lock().push(msg);
        self.notify(to);
    }

    pub fn take_abort(&self, shard: ShardId) -> Option<AbortMsg> {
        take_matching(&self.aborts, |m| m.to == shard)
    }

    pub fn send_commit(&self, msg: CommitMsg) {
        let to = msg.to;
        self.commits.lock().push(msg);
        self.notify(to);
    }

    pub fn take_commit(&self, shard: ShardId) -> Option<CommitMsg> {
        take_matching(&self.commits, |m| m.to == shard)
    }

    // --- router-facing acknowledgment pools ---

    pub fn send_commit_ack(&self, ack: CommitAck) {
        self.commit_acks.lock().push(ack);
    }

    pub fn drain_commit_acks(&self) -> Vec<CommitAck> {
        std::mem::take(&mut *self.commit_acks.lock())
    }

    pub fn send_abort_notice(&self, notice: AbortNotice) {
        self.abort_notices.lock().push(notice);
    }

    pub fn drain_abort_notices(&self) -> Vec<AbortNotice> {
        std::mem::take(&mut *self.abort_notices.lock())
    }

    // --- request queues ---

    /// Whether the (shard, txid) queue has no outstanding entry.
    pub fn queue_is_empty(&self, shard: ShardId, txid: TransactionId) -> bool {
        self.queues
            .lock()
            .get(&(shard, txid))
            .map(|q| q.is_empty())
            .unwrap_or(true)
    }

    /// Enqueue a request for `shard`. Fails if the queue already holds an
    /// outstanding entry; the router must wait for the prior response.
    pub fn enqueue_request(&self, shard: ShardId, request: Request) -> Result<()> {
        {
            let mut queues = self.queues.lock();
            let queue = queues.entry((shard, request.txid)).or_default();
            if !queue.is_empty() {
                return Err(FabricError::QueueBusy {
                    shard: shard.to_string(),
                    txid: request.txid.to_string(),
                });
            }
            queue.push_back(request);
        }
        self.notify(shard);
        Ok(())
    }

    /// Transactions with a pending request on `shard`, in no particular
    /// order across transactions.
    pub fn pending_requests(&self, shard: ShardId) -> Vec<TransactionId> {
        self.queues
            .lock()
            .iter()
            .filter(|((s, _), q)| *s == shard && !q.is_empty())
            .map(|((_, txid), _)| *txid)
            .collect()
    }

    /// Peek the head request of a (shard, txid) queue without consuming it.
    pub fn head_request(&self, shard: ShardId, txid: TransactionId) -> Option<Request> {
        self.queues
            .lock()
            .get(&(shard, txid))
            .and_then(|q| q.front().cloned())
    }

    /// Consume the head request of a (shard, txid) queue.
    pub fn pop_request(&self, shard: ShardId, txid: TransactionId) -> Option<Request> {
        self.queues
            .lock()
            .get_mut(&(shard, txid))
            .and_then(|q| q.pop_front())
    }

    /// Drop every queued request for one transaction on one shard.
    pub fn clear_queue(&self, shard: ShardId, txid: TransactionId) {
        self.queues.lock().remove(&(shard, txid));
    }

    /// Drop every queued request for a shard, across all transactions.
    /// Used on shard restart.
    pub fn clear_shard(&self, shard: ShardId) {
        self.queues.lock().retain(|(s, _), _| *s != shard);
    }
}

impl Default for MessageFabric {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove and return the first pool entry matching `pred`.
fn take_matching<T>(pool: &Mutex<Vec<T>>, pred: impl Fn(&T) -> bool) -> Option<T> {
    let mut pool = pool.lock();
    let idx = pool.iter().position(pred)?;
    Some(pool.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AbortReason;
    use crate::queue::RequestBody;
    use chorus_common::Timestamp;

    fn request(txid: TransactionId, key: &str) -> Request {
        Request {
            txid,
            body: RequestBody::Read {
                key: key.to_string(),
            },
            first_statement: true,
            read_ts: None,
            coordinator: ShardId(1),
        }
    }

    #[test]
    fn test_take_is_exactly_once() {
        let fabric = MessageFabric::new();
        let txid = TransactionId::new();
        fabric.send_prepare(PrepareMsg {
            to: ShardId(1),
            txid,
            coordinator: ShardId(1),
        });

        assert!(fabric.take_prepare(ShardId(2)).is_none());
        assert!(fabric.take_prepare(ShardId(1)).is_some());
        assert!(fabric.take_prepare(ShardId(1)).is_none());
    }

    #[test]
    fn test_pools_are_independent() {
        let fabric = MessageFabric::new();
        let txid = TransactionId::new();
        fabric.send_commit(CommitMsg {
            to: ShardId(1),
            txid,
            commit_ts: None,
        });
        fabric.send_abort(AbortMsg {
            to: ShardId(1),
            txid,
        });

        // Consuming from one pool leaves the other untouched.
        assert!(fabric.take_commit(ShardId(1)).is_some());
        assert!(fabric.take_abort(ShardId(1)).is_some());
    }

    #[test]
    fn test_queue_backpressure() {
        let fabric = MessageFabric::new();
        let txid = TransactionId::new();
        let shard = ShardId(1);

        fabric.enqueue_request(shard, request(txid, "k1")).unwrap();
        let err = fabric.enqueue_request(shard, request(txid, "k2")).unwrap_err();
        assert!(matches!(err, FabricError::QueueBusy { .. }));

        // Draining the head frees the queue.
        assert!(fabric.pop_request(shard, txid).is_some());
        fabric.enqueue_request(shard, request(txid, "k2")).unwrap();
    }

    #[test]
    fn test_backpressure_is_scoped_per_shard_and_txn() {
        let fabric = MessageFabric::new();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();

        fabric.enqueue_request(ShardId(1), request(t1, "k")).unwrap();
        // Other transactions and other shards proceed unaffected.
        fabric.enqueue_request(ShardId(1), request(t2, "k")).unwrap();
        fabric.enqueue_request(ShardId(2), request(t1, "k")).unwrap();
    }

    #[test]
    fn test_clear_shard_erases_queued_requests() {
        let fabric = MessageFabric::new();
        let t1 = TransactionId::new();
        let t2 = TransactionId::new();
        fabric.enqueue_request(ShardId(1), request(t1, "k")).unwrap();
        fabric.enqueue_request(ShardId(1), request(t2, "k")).unwrap();
        fabric.enqueue_request(ShardId(2), request(t1, "k")).unwrap();

        fabric.clear_shard(ShardId(1));
        assert!(fabric.pending_requests(ShardId(1)).is_empty());
        assert_eq!(fabric.pending_requests(ShardId(2)), vec![t1]);
    }

    #[test]
    fn test_notice_pools_drain_completely() {
        let fabric = MessageFabric::new();
        let txid = TransactionId::new();
        fabric.send_commit_ack(CommitAck {
            from: ShardId(1),
            txid,
            commit_ts: Timestamp(3),
        });
        fabric.send_abort_notice(AbortNotice {
            from: ShardId(2),
            txid,
            reason: AbortReason::Spontaneous,
        });

        assert_eq!(fabric.drain_commit_acks().len(), 1);
        assert_eq!(fabric.drain_commit_acks().len(), 0);
        assert_eq!(fabric.drain_abort_notices().len(), 1);
    }
}
