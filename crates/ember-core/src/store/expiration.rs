//! Background active expiration: every 100ms, sample and evict a bounded
//! batch of expired keys so idle keys with a TTL are reclaimed even without
//! being read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::keyspace::Keyspace;

const ACTIVE_EXPIRE_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns the active expiration loop as a background task. Drop the
/// returned [`watch::Sender`] (or send `true`) to stop it; the task exits
/// promptly rather than waiting out its current sleep.
pub fn spawn_expiration_loop(keyspace: Arc<Keyspace>) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (tx, mut rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(ACTIVE_EXPIRE_INTERVAL) => {
                    let evicted = keyspace.active_expire_cycle();
                    if evicted > 0 {
                        debug!(evicted, "active expiration cycle evicted keys");
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    (handle, tx)
}
