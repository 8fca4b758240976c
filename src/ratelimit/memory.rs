//! In-process limiter storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::container::RateLimiterContainer;
use super::strategy::RateLimiterStrategy;
use crate::error::Result;

/// A live container entry.
///
/// Dropping the entry drops its cancel sender, which wakes and terminates
/// the entry's expiry task without evicting anything.
struct Entry {
    strategy: Arc<dyn RateLimiterStrategy>,
    /// Distinguishes this entry from any later entry under the same key,
    /// so a stale expiry task can never evict a replacement.
    epoch: u64,
    _cancel: oneshot::Sender<()>,
}

/// In-memory limiter container.
///
/// Structural changes to the map take the write lock; reads take the read
/// lock. `consume` clones the strategy handle out under the read lock and
/// releases it before touching the strategy's own counter, so the map lock
/// is never held across strategy-level synchronization.
///
/// Each insert spawns exactly one expiry task that waits for the strategy's
/// expiry delay and then removes the entry. Replacing or deleting an entry
/// cancels its task.
pub struct InMemoryContainer {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    next_epoch: AtomicU64,
}

impl InMemoryContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the container holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiterContainer for InMemoryContainer {
    async fn has(&self, client_key: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(client_key))
    }

    async fn consume(&self, client_key: &str) -> Result<()> {
        let strategy = {
            let entries = self.entries.read();
            entries.get(client_key).map(|e| Arc::clone(&e.strategy))
        };

        match strategy {
            Some(strategy) => strategy.consume(),
            // Unseen keys are never limited until an entry is created
            None => Ok(()),
        }
    }

    async fn insert(
        &self,
        client_key: &str,
        strategy: Arc<dyn RateLimiterStrategy>,
    ) -> Result<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let delay = strategy.expiry_delay();

        let replaced = self.entries.write().insert(
            client_key.to_string(),
            Entry {
                strategy,
                epoch,
                _cancel: cancel_tx,
            },
        );
        // Dropping the superseded entry drops its cancel sender and wakes
        // its expiry task; the epoch check covers a timer that already
        // fired and is waiting on the write lock.
        drop(replaced);

        debug!(key = %client_key, delay_ms = delay.as_millis() as u64, "Created limiter entry");

        let entries = Arc::clone(&self.entries);
        let key = client_key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let mut map = entries.write();
                    if map.get(&key).is_some_and(|e| e.epoch == epoch) {
                        map.remove(&key);
                        debug!(key = %key, "Limiter entry expired");
                    }
                }
                _ = cancel_rx => {
                    trace!(key = %key, "Expiry task cancelled");
                }
            }
        });

        Ok(())
    }

    async fn delete(&self, client_key: &str) -> Result<()> {
        self.entries.write().remove(client_key);
        Ok(())
    }
}
