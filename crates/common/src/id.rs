//! Identifiers for transactions and shards
//!
//! Transaction identifiers use UUIDv7: time-ordered, globally unique, and
//! stable across the router and every shard the transaction touches.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique, time-ordered transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// A fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID, mainly for tests and deserialization.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse the canonical hyphenated form.
    pub fn parse(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("invalid transaction id: {}", e))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for TransactionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransactionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Byte order, which for UUIDv7 is also creation order.
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

/// Identifier of a shard (an independently replicated keyspace partition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_roundtrip() {
        let id = TransactionId::new();
        let parsed = TransactionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_transaction_ids_are_unique_and_ordered() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        // UUIDv7 is time-ordered at millisecond precision, so an id
        // generated later never sorts strictly before an earlier one.
        assert!(a < b || a.0.as_bytes()[..6] == b.0.as_bytes()[..6]);
    }

    #[test]
    fn test_shard_id_display() {
        assert_eq!(ShardId(3).to_string(), "s3");
    }
}
