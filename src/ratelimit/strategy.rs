//! Per-client limiter strategy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TollgateError};

/// Serialized state of a limiter strategy, sufficient to reconstruct an
/// equivalent instance in another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    /// The client key the strategy was created for
    pub client_key: String,
    /// Maximum permits
    pub capacity: u32,
    /// Delay after which the owning entry is destroyed, in milliseconds
    pub expiry_delay_ms: u64,
    /// Permits left in the current window
    pub remaining: u32,
}

impl StrategySnapshot {
    /// The expiry delay as a [`Duration`].
    pub fn expiry_delay(&self) -> Duration {
        Duration::from_millis(self.expiry_delay_ms)
    }
}

/// A per-client admission strategy.
///
/// One instance enforces the permit limit for a single client key. The
/// owning container is responsible for destroying the instance after
/// [`expiry_delay`](RateLimiterStrategy::expiry_delay) elapses; the strategy
/// itself never refills within its lifetime.
pub trait RateLimiterStrategy: Send + Sync {
    /// Take one permit.
    ///
    /// Returns [`TollgateError::TooManyRequests`] when no permits remain.
    /// The check and decrement are atomic with respect to concurrent
    /// callers; a failed consume never mutates the count.
    fn consume(&self) -> Result<()>;

    /// The client key this strategy was created for.
    fn client_key(&self) -> &str;

    /// Maximum permits per window.
    fn capacity(&self) -> u32;

    /// Permits left in the current window.
    fn remaining(&self) -> u32;

    /// How long after creation the owning container entry should be
    /// destroyed.
    fn expiry_delay(&self) -> Duration;

    /// Capture the strategy's state for remote storage.
    fn snapshot(&self) -> StrategySnapshot;
}

/// Token-bucket strategy: a fixed pool of permits that drains one per
/// request and only resets when the container entry expires and is
/// recreated.
pub struct TokenBucketStrategy {
    client_key: String,
    capacity: u32,
    expiry_delay: Duration,
    remaining: AtomicU32,
}

impl TokenBucketStrategy {
    /// Create a full bucket for a client key.
    pub fn new(client_key: impl Into<String>, capacity: u32, expiry_delay: Duration) -> Self {
        Self {
            client_key: client_key.into(),
            capacity,
            expiry_delay,
            remaining: AtomicU32::new(capacity),
        }
    }

    /// Reconstruct a bucket from a snapshot, preserving the remaining count.
    pub fn from_snapshot(snapshot: StrategySnapshot) -> Self {
        let remaining = snapshot.remaining.min(snapshot.capacity);
        Self {
            client_key: snapshot.client_key,
            capacity: snapshot.capacity,
            expiry_delay: Duration::from_millis(snapshot.expiry_delay_ms),
            remaining: AtomicU32::new(remaining),
        }
    }
}

impl RateLimiterStrategy for TokenBucketStrategy {
    fn consume(&self) -> Result<()> {
        // checked_sub keeps the count from underflowing; on None the value
        // is left untouched and the consume fails.
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| TollgateError::TooManyRequests)
    }

    fn client_key(&self) -> &str {
        &self.client_key
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    fn expiry_delay(&self) -> Duration {
        self.expiry_delay
    }

    fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            client_key: self.client_key.clone(),
            capacity: self.capacity,
            expiry_delay_ms: self.expiry_delay.as_millis() as u64,
            remaining: self.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_consume_within_capacity() {
        let bucket = TokenBucketStrategy::new("10.0.0.1", 3, Duration::from_secs(60));

        assert!(bucket.consume().is_ok());
        assert_eq!(bucket.remaining(), 2);
    }

    #[test]
    fn test_consume_exhausts_at_capacity() {
        let bucket = TokenBucketStrategy::new("10.0.0.1", 5, Duration::from_secs(60));

        for _ in 0..5 {
            assert!(bucket.consume().is_ok());
        }

        // The 6th consume must fail without mutating the count
        let err = bucket.consume().unwrap_err();
        assert!(matches!(err, TollgateError::TooManyRequests));
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_zero_capacity_rejects_immediately() {
        let bucket = TokenBucketStrategy::new("10.0.0.1", 0, Duration::from_secs(60));
        assert!(bucket.consume().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_consume_grants_exactly_capacity() {
        const CAPACITY: u32 = 10;
        const TASKS: u32 = 25;

        let bucket = Arc::new(TokenBucketStrategy::new(
            "10.0.0.1",
            CAPACITY,
            Duration::from_secs(60),
        ));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move { bucket.consume().is_ok() }));
        }

        let mut granted = 0;
        let mut rejected = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            } else {
                rejected += 1;
            }
        }

        assert_eq!(granted, CAPACITY);
        assert_eq!(rejected, TASKS - CAPACITY);
        assert_eq!(bucket.remaining(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let bucket = TokenBucketStrategy::new("10.0.0.1:52811", 60, Duration::from_secs(60));
        bucket.consume().unwrap();
        bucket.consume().unwrap();

        let snapshot = bucket.snapshot();
        let restored = TokenBucketStrategy::from_snapshot(snapshot.clone());

        assert_eq!(restored.client_key(), "10.0.0.1:52811");
        assert_eq!(restored.capacity(), 60);
        assert_eq!(restored.expiry_delay(), Duration::from_secs(60));
        assert_eq!(restored.remaining(), 58);
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_remaining_clamped_to_capacity() {
        let snapshot = StrategySnapshot {
            client_key: "10.0.0.1".to_string(),
            capacity: 5,
            expiry_delay_ms: 1000,
            remaining: 50,
        };

        let restored = TokenBucketStrategy::from_snapshot(snapshot);
        assert_eq!(restored.remaining(), 5);
    }
}
