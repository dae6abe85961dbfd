//! Shard-side state machines for the chorus transaction core
//!
//! A [`ShardParticipant`] drives each transaction it hosts through
//! `active → [prepared] → committed | aborted`, draining its request queues
//! against the shard's storage engine. One participant per transaction also
//! assumes the coordinator role, orchestrating two-phase commit over the
//! transaction's full participant set.
//!
//! Participants never share state; everything inter-shard travels through
//! the messaging fabric.

mod actor;
mod coordinator;
mod error;
mod history;
mod participant;

pub use actor::{spawn_actor, ShardActorHandle};
pub use coordinator::CoordinatorRole;
pub use error::{Result, ShardError};
pub use history::GlobalHistory;
pub use participant::{ShardParticipant, TxnPhase};
