//! Transaction router for the chorus transaction core
//!
//! The router translates a client's transaction operations into per-shard
//! dispatches: it resolves owning shards through the catalog, tracks which
//! shards a transaction has touched and how, chooses a read timestamp, and
//! at commit time selects the cheapest commit strategy that is still
//! atomic - direct commits where possible, full two-phase commit only when
//! two or more shards hold writes.

mod catalog;
mod cluster;
mod error;
mod router;

pub use catalog::Catalog;
pub use cluster::{Cluster, ClusterConfig};
pub use error::{Result, RouterError};
pub use router::{CommitStrategy, Router, TimestampPolicy, TransactionState};
