//! End-to-end scenarios for the coordination core, driven through the
//! deterministic cluster pump.

use chorus_common::{HistoryOp, OpKind, ReadConcern, ShardId, TransactionId};
use chorus_router::{Cluster, ClusterConfig, CommitStrategy, RouterError};
use chorus_shard::TxnPhase;
use chorus_storage::StoreConfig;

fn cluster(num_shards: u32) -> Cluster {
    let mut cluster = Cluster::new(ClusterConfig {
        num_shards,
        ..ClusterConfig::default()
    });
    cluster.assign_key("k1", ShardId(1));
    if num_shards >= 2 {
        cluster.assign_key("k2", ShardId(2));
    }
    cluster
}

#[test]
fn test_single_shard_write_commit() {
    let mut cluster = cluster(1);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    let strategy = cluster.router().commit_transaction(t1).unwrap();
    assert_eq!(strategy, CommitStrategy::SingleShard);
    cluster.run_until_quiescent();

    assert_eq!(cluster.shard(ShardId(1)).lock().phase(t1), Some(TxnPhase::Committed));
    assert_eq!(
        cluster.history().get(t1).unwrap(),
        vec![HistoryOp::Write {
            key: "k1".to_string(),
            value: t1.to_string(),
        }]
    );

    // The committed value is visible to a later reader.
    let t2 = TransactionId::new();
    cluster.router().start_transaction(t2, None);
    cluster.router().route_operation(t2, "k1", OpKind::Read).unwrap();
    cluster.run_until_quiescent();
    cluster.router().commit_transaction(t2).unwrap();
    cluster.run_until_quiescent();

    assert_eq!(
        cluster.history().get(t2).unwrap(),
        vec![HistoryOp::Read {
            key: "k1".to_string(),
            value: Some(t1.to_string()),
        }]
    );
}

#[test]
fn test_two_shard_write_commit_uses_2pc() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();
    cluster.router().route_operation(t1, "k2", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    let strategy = cluster.router().commit_transaction(t1).unwrap();
    assert_eq!(strategy, CommitStrategy::TwoPhase);
    cluster.run_until_quiescent();

    for id in [ShardId(1), ShardId(2)] {
        assert_eq!(cluster.shard(id).lock().phase(t1), Some(TxnPhase::Committed));
    }

    // Both shards committed at the same agreed timestamp: the maximum of
    // the reported prepare timestamps.
    let acks = cluster.fabric().drain_commit_acks();
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].commit_ts, acks[1].commit_ts);

    let ops = cluster.history().get(t1).unwrap();
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| op.is_write()));
    let mut keys: Vec<&str> = ops.iter().map(|op| op.key()).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["k1", "k2"]);
}

#[test]
fn test_write_conflict_aborts_exactly_one() {
    let mut cluster = cluster(1);
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().start_transaction(t2, None);

    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();
    cluster.router().route_operation(t2, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    // The second writer collided and aborted.
    assert_eq!(cluster.shard(ShardId(1)).lock().phase(t2), Some(TxnPhase::Aborted));

    let err = cluster.router().commit_transaction(t2).unwrap_err();
    assert!(matches!(err, RouterError::ParticipantAborted { .. }));

    // The first writer proceeds normally.
    cluster.router().commit_transaction(t1).unwrap();
    cluster.run_until_quiescent();

    assert_eq!(
        cluster.history().get(t1).unwrap(),
        vec![HistoryOp::Write {
            key: "k1".to_string(),
            value: t1.to_string(),
        }]
    );
    assert!(cluster.history().get(t2).is_none());
}

#[test]
fn test_read_only_multi_shard_skips_prepare() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Read).unwrap();
    cluster.router().route_operation(t1, "k2", OpKind::Read).unwrap();
    cluster.run_until_quiescent();

    let strategy = cluster.router().commit_transaction(t1).unwrap();
    assert_eq!(strategy, CommitStrategy::ReadOnly);
    cluster.run_until_quiescent();

    for id in [ShardId(1), ShardId(2)] {
        assert_eq!(cluster.shard(id).lock().phase(t1), Some(TxnPhase::Committed));
    }
    let ops = cluster.history().get(t1).unwrap();
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|op| !op.is_write()));
}

#[test]
fn test_single_write_shard_optimization() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Read).unwrap();
    cluster.router().route_operation(t1, "k2", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    let strategy = cluster.router().commit_transaction(t1).unwrap();
    assert_eq!(strategy, CommitStrategy::SingleWriteShard);
    cluster.run_until_quiescent();

    for id in [ShardId(1), ShardId(2)] {
        assert_eq!(cluster.shard(id).lock().phase(t1), Some(TxnPhase::Committed));
    }
}

#[test]
fn test_shard_restart_aborts_unprepared_work() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    cluster.restart_shard(ShardId(1));

    // Anything depending on s1's outcome for t1 now sees an abort.
    let err = cluster.router().commit_transaction(t1).unwrap_err();
    assert!(matches!(err, RouterError::ParticipantAborted { .. }));
    assert!(cluster.history().get(t1).is_none());
}

#[test]
fn test_abort_broadcast_cleans_up_other_participants() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.router().route_operation(t1, "k2", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    cluster.restart_shard(ShardId(1));

    let err = cluster.router().commit_transaction(t1).unwrap_err();
    assert!(matches!(err, RouterError::ParticipantAborted { .. }));

    // The rejection broadcast an abort to the other engaged shard.
    cluster.run_until_quiescent();
    assert_eq!(cluster.shard(ShardId(2)).lock().phase(t1), Some(TxnPhase::Aborted));
    assert!(cluster.history().get(t1).is_none());
}

#[test]
fn test_coordinator_is_first_joined_shard() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().start_transaction(t1, None);
    // Join s2 first, then s1: s2 must coordinate.
    cluster.router().route_operation(t1, "k2", OpKind::Write).unwrap();
    cluster.run_until_quiescent();
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    cluster.router().commit_transaction(t1).unwrap();

    // Drain the coordinate-commit hand-off only on s2.
    let shard2 = cluster.shard(ShardId(2));
    shard2.lock().drain();
    assert!(shard2.lock().is_coordinator(t1));

    cluster.run_until_quiescent();
    for id in [ShardId(1), ShardId(2)] {
        assert_eq!(cluster.shard(id).lock().phase(t1), Some(TxnPhase::Committed));
    }
}

#[test]
fn test_key_migration_reroutes() {
    let mut cluster = cluster(2);
    let t1 = TransactionId::new();

    cluster.router().catalog_mut().migrate("k1", ShardId(2));
    cluster.router().start_transaction(t1, None);
    cluster.router().route_operation(t1, "k1", OpKind::Write).unwrap();
    cluster.run_until_quiescent();

    assert_eq!(cluster.shard(ShardId(2)).lock().phase(t1), Some(TxnPhase::Active));
    assert_eq!(cluster.shard(ShardId(1)).lock().phase(t1), None);
}

#[test]
fn test_empty_transaction_cannot_commit() {
    let mut cluster = cluster(1);
    let t1 = TransactionId::new();
    cluster.router().start_transaction(t1, None);
    let err = cluster.router().commit_transaction(t1).unwrap_err();
    assert!(matches!(err, RouterError::NoParticipants(_)));
}

#[test]
fn test_prepare_conflict_defers_read_until_decision() {
    let mut cluster = Cluster::new(ClusterConfig {
        num_shards: 2,
        store: StoreConfig::default(),
        read_concern: ReadConcern::Snapshot,
        ..ClusterConfig::default()
    });
    cluster.assign_key("k1", ShardId(1));
    cluster.assign_key("k2", ShardId(2));

    // Writer spanning both shards, paused between prepare and commit by
    // driving shards manually.
    let writer = TransactionId::new();
    cluster.router().start_transaction(writer, None);
    cluster.router().route_operation(writer, "k1", OpKind::Write).unwrap();
    cluster.router().route_operation(writer, "k2", OpKind::Write).unwrap();
    cluster.run_until_quiescent();
    cluster.router().commit_transaction(writer).unwrap();

    // Let s1 coordinate and prepare itself, but withhold s2's drain so the
    // decision cannot fire yet.
    let shard1 = cluster.shard(ShardId(1));
    shard1.lock().drain();
    assert_eq!(shard1.lock().phase(writer), Some(TxnPhase::Prepared));

    // A reader hitting the prepared key is deferred, not aborted.
    let reader = TransactionId::new();
    cluster.router().start_transaction(reader, None);
    cluster.router().route_operation(reader, "k1", OpKind::Read).unwrap();
    shard1.lock().drain();
    assert_eq!(shard1.lock().phase(reader), Some(TxnPhase::Active));
    assert!(!cluster.fabric().queue_is_empty(ShardId(1), reader));

    // Once the full protocol runs, the blocked read completes.
    cluster.run_until_quiescent();
    assert!(cluster.fabric().queue_is_empty(ShardId(1), reader));
    assert_eq!(cluster.shard(ShardId(2)).lock().phase(writer), Some(TxnPhase::Committed));
}
