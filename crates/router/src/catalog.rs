//! Key-to-shard catalog
//!
//! A static lookup table mapping each key to its owning shard, stable for
//! a transaction's lifetime. The only mutation is an explicit migration,
//! which atomically reassigns one key.

use std::collections::HashMap;

use chorus_common::ShardId;

/// Mapping from key to owning shard.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    assignments: HashMap<String, ShardId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a key to a shard at setup time.
    pub fn assign(&mut self, key: impl Into<String>, shard: ShardId) {
        self.assignments.insert(key.into(), shard);
    }

    /// The shard owning `key`, if any.
    pub fn lookup(&self, key: &str) -> Option<ShardId> {
        self.assignments.get(key).copied()
    }

    /// Atomically move a key to a different owning shard.
    pub fn migrate(&mut self, key: &str, to: ShardId) {
        self.assignments.insert(key.to_string(), to);
    }
}
