//! Cluster wiring for tests and embedded use
//!
//! Builds a router, a set of shard participants over in-memory stores, and
//! the fabric connecting them. Shards can be driven deterministically with
//! [`Cluster::run_until_quiescent`] or spawned as independent actors.

use std::sync::Arc;

use chorus_common::{ReadConcern, ShardId};
use chorus_fabric::MessageFabric;
use chorus_shard::{spawn_actor, GlobalHistory, ShardActorHandle, ShardParticipant};
use chorus_storage::{MemoryStore, StoreConfig};
use parking_lot::Mutex;

use crate::catalog::Catalog;
use crate::router::{Router, TimestampPolicy};

/// Configuration for a test/embedded cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub num_shards: u32,
    pub read_concern: ReadConcern,
    pub store: StoreConfig,
    pub policy: TimestampPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            num_shards: 2,
            read_concern: ReadConcern::Snapshot,
            store: StoreConfig::default(),
            policy: TimestampPolicy::LatestObserved,
        }
    }
}

/// A router plus its shards, sharing one fabric and one global history.
pub struct Cluster {
    fabric: Arc<MessageFabric>,
    history: Arc<GlobalHistory>,
    shards: Vec<Arc<Mutex<ShardParticipant<MemoryStore>>>>,
    router: Router,
}

impl Cluster {
    /// Build a cluster with shards `s1..=sN` and an empty catalog.
    pub fn new(config: ClusterConfig) -> Self {
        let fabric = Arc::new(MessageFabric::new());
        let history = Arc::new(GlobalHistory::new());

        let shards = (1..=config.num_shards)
            .map(|n| {
                Arc::new(Mutex::new(ShardParticipant::new(
                    ShardId(n),
                    config.read_concern,
                    MemoryStore::new(config.store),
                    fabric.clone(),
                    history.clone(),
                )))
            })
            .collect();

        let router = Router::new(
            config.read_concern,
            config.policy,
            Catalog::new(),
            fabric.clone(),
        );

        Self {
            fabric,
            history,
            shards,
            router,
        }
    }

    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn fabric(&self) -> Arc<MessageFabric> {
        self.fabric.clone()
    }

    pub fn history(&self) -> Arc<GlobalHistory> {
        self.history.clone()
    }

    /// Assign a key to a shard in the router's catalog.
    pub fn assign_key(&mut self, key: &str, shard: ShardId) {
        self.router.catalog_mut().assign(key, shard);
    }

    /// Handle to one shard participant.
    pub fn shard(&self, id: ShardId) -> Arc<Mutex<ShardParticipant<MemoryStore>>> {
        self.shards[(id.0 - 1) as usize].clone()
    }

    /// Crash one shard: erase its unprepared work and queued requests.
    pub fn restart_shard(&self, id: ShardId) {
        self.shard(id).lock().restart();
    }

    /// Deterministically run every shard until no transition anywhere is
    /// enabled. Returns the number of transitions taken. Fair by
    /// construction: every shard gets a full drain each cycle.
    pub fn run_until_quiescent(&self) -> usize {
        let mut total = 0;
        loop {
            let mut moved = 0;
            for shard in &self.shards {
                moved += shard.lock().drain();
            }
            if moved == 0 {
                return total;
            }
            total += moved;
        }
    }

    /// Spawn one actor task per shard. The returned handles stop the
    /// actors on shutdown.
    pub fn spawn_actors(&self) -> Vec<ShardActorHandle> {
        self.shards
            .iter()
            .map(|shard| spawn_actor(shard.clone()))
            .collect()
    }
}
