//! Per-shard multi-version storage for the chorus transaction core
//!
//! The coordination core treats storage as an external collaborator: one
//! snapshot-isolated, multi-version store per shard, spoken to only through
//! the [`ShardStore`] trait. [`MemoryStore`] is the in-memory implementation
//! used by shards and tests.

mod error;
mod memory;
mod store;

pub use error::{Result, StoreError, StoreStatus};
pub use memory::MemoryStore;
pub use store::{ShardStore, StoreConfig};
