//! Shard-local logical timestamps
//!
//! Each shard's storage engine issues strictly increasing logical
//! timestamps. Prepare and commit points are expressed in them; the
//! coordinator's commit timestamp is the maximum of the participants'
//! prepare timestamps, so `Ord` on this type is load-bearing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A shard-local logical timestamp.
///
/// "No fixed snapshot" and "pick your own commit timestamp" are modeled as
/// `Option<Timestamp>` at the call sites, not as a sentinel value here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The lowest timestamp a shard will ever issue.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The immediately following timestamp.
    pub fn next(self) -> Timestamp {
        Timestamp(self.0 + 1)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts{}", self.0)
    }
}
