//! Redis-backed limiter storage.
//!
//! Strategy state is stored as a JSON snapshot per client key so any
//! process sharing the cache sees the same budget. The fetch/modify/store
//! cycle in [`consume`](RateLimiterContainer::consume) is not transactional:
//! concurrent consumers on the same key across processes can race and lose
//! an update. This is a documented consistency limitation, not a guarantee
//! the backend closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::container::RateLimiterContainer;
use super::factory::StrategyFactory;
use super::strategy::{RateLimiterStrategy, StrategySnapshot};
use crate::error::Result;

/// Prefix applied to every cache key.
const KEY_PREFIX: &str = "tollgate";

/// TTL for stored snapshots. Deliberately long and independent of the
/// logical expiry delay; it is a safety net against entries whose local
/// eviction timer never fired (process restart), not the rate limit window.
const SNAPSHOT_TTL: Duration = Duration::from_secs(3600);

/// Pending local eviction timer for a remote entry.
struct TimerHandle {
    epoch: u64,
    _cancel: oneshot::Sender<()>,
}

/// Redis-backed limiter container.
///
/// Expiry timers run in the inserting process only; the TTL on stored
/// snapshots covers entries orphaned by a crash.
pub struct RedisContainer {
    connection: ConnectionManager,
    factory: Arc<dyn StrategyFactory>,
    timers: Arc<RwLock<HashMap<String, TimerHandle>>>,
    next_epoch: AtomicU64,
}

impl RedisContainer {
    /// Connect to a Redis server and build a container around it.
    pub async fn connect(url: &str, factory: Arc<dyn StrategyFactory>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self::new(connection, factory))
    }

    /// Build a container from an existing connection manager.
    pub fn new(connection: ConnectionManager, factory: Arc<dyn StrategyFactory>) -> Self {
        Self {
            connection,
            factory,
            timers: Arc::new(RwLock::new(HashMap::new())),
            next_epoch: AtomicU64::new(0),
        }
    }

    fn storage_key(client_key: &str) -> String {
        format!("{}:{}", KEY_PREFIX, client_key)
    }

    /// Arm the local eviction timer for a client key, cancelling any timer
    /// a previous insert armed for the same key.
    fn arm_eviction(&self, client_key: &str, delay: Duration) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let replaced = self.timers.write().insert(
            client_key.to_string(),
            TimerHandle {
                epoch,
                _cancel: cancel_tx,
            },
        );
        drop(replaced);

        let timers = Arc::clone(&self.timers);
        let mut connection = self.connection.clone();
        let key = client_key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    // A replacement may have won the race while we were
                    // waiting for the write lock
                    let owned = {
                        let mut map = timers.write();
                        if map.get(&key).is_some_and(|t| t.epoch == epoch) {
                            map.remove(&key);
                            true
                        } else {
                            false
                        }
                    };
                    if owned {
                        let storage_key = Self::storage_key(&key);
                        let result: redis::RedisResult<()> =
                            connection.del(&storage_key).await;
                        match result {
                            Ok(()) => debug!(key = %key, "Limiter entry expired"),
                            Err(e) => {
                                warn!(key = %key, error = %e, "Failed to delete expired limiter entry")
                            }
                        }
                    }
                }
                _ = cancel_rx => {
                    trace!(key = %key, "Eviction timer cancelled");
                }
            }
        });
    }
}

#[async_trait]
impl RateLimiterContainer for RedisContainer {
    async fn has(&self, client_key: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let exists: bool = connection.exists(Self::storage_key(client_key)).await?;
        Ok(exists)
    }

    async fn consume(&self, client_key: &str) -> Result<()> {
        let storage_key = Self::storage_key(client_key);
        let mut connection = self.connection.clone();

        let raw: Option<String> = connection.get(&storage_key).await?;
        let Some(raw) = raw else {
            // Miss is tolerated as "no entry": unseen keys are not limited
            return Ok(());
        };

        let snapshot: StrategySnapshot = serde_json::from_str(&raw)?;
        let strategy = self.factory.restore(snapshot);
        strategy.consume()?;

        // The decrement succeeded; a failed re-store is reported, not
        // swallowed
        let payload = serde_json::to_string(&strategy.snapshot())?;
        connection
            .set_ex::<_, _, ()>(&storage_key, payload, SNAPSHOT_TTL.as_secs())
            .await?;

        Ok(())
    }

    async fn insert(
        &self,
        client_key: &str,
        strategy: Arc<dyn RateLimiterStrategy>,
    ) -> Result<()> {
        let payload = serde_json::to_string(&strategy.snapshot())?;
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(
                Self::storage_key(client_key),
                payload,
                SNAPSHOT_TTL.as_secs(),
            )
            .await?;

        debug!(
            key = %client_key,
            delay_ms = strategy.expiry_delay().as_millis() as u64,
            "Created limiter entry"
        );

        self.arm_eviction(client_key, strategy.expiry_delay());
        Ok(())
    }

    async fn delete(&self, client_key: &str) -> Result<()> {
        self.timers.write().remove(client_key);

        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(Self::storage_key(client_key))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_prefix() {
        assert_eq!(
            RedisContainer::storage_key("10.0.0.1:52811"),
            "tollgate:10.0.0.1:52811"
        );
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let snapshot = StrategySnapshot {
            client_key: "10.0.0.1".to_string(),
            capacity: 60,
            expiry_delay_ms: 60_000,
            remaining: 42,
        };

        let payload = serde_json::to_string(&snapshot).unwrap();
        let decoded: StrategySnapshot = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_malformed_snapshot_is_serialization_error() {
        let err = serde_json::from_str::<StrategySnapshot>("{\"nope\":1}").unwrap_err();
        let err: crate::error::TollgateError = err.into();
        assert!(matches!(
            err,
            crate::error::TollgateError::Serialization(_)
        ));
    }
}
