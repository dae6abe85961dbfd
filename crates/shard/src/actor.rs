//! Async actor loop for a shard participant
//!
//! One task per shard: block on the fabric's wakeup, drain every enabled
//! transition, and go back to sleep. The participant's mutex is never held
//! across an await point.

use std::sync::Arc;

use chorus_storage::ShardStore;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::participant::ShardParticipant;

/// Handle to a running shard actor.
pub struct ShardActorHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ShardActorHandle {
    /// Stop the actor and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

/// Spawn the event loop for one shard participant.
pub fn spawn_actor<S: ShardStore + 'static>(
    participant: Arc<Mutex<ShardParticipant<S>>>,
) -> ShardActorHandle {
    let (fabric, id) = {
        let p = participant.lock();
        (p.fabric(), p.id())
    };
    let wakeup = fabric.wakeup(id);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        loop {
            // Register for the wakeup before draining, so a message sent
            // mid-drain is not missed.
            let notified = wakeup.notified();
            participant.lock().drain();
            tokio::select! {
                _ = notified => {}
                _ = &mut shutdown_rx => break,
            }
        }
    });

    ShardActorHandle {
        shutdown: shutdown_tx,
        join,
    }
}
