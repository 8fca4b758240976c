//! Strategy construction.

use std::sync::Arc;
use std::time::Duration;

use super::strategy::{RateLimiterStrategy, StrategySnapshot, TokenBucketStrategy};

/// Default bucket capacity when none is configured.
const DEFAULT_CAPACITY: u32 = 60;
/// Default expiry delay when none is configured.
const DEFAULT_EXPIRY_DELAY: Duration = Duration::from_secs(60);

/// Builds limiter strategies for client keys.
///
/// Storage backends also use the factory to reconstruct a strategy from a
/// deserialized snapshot, so the strategy kind in use is decided in exactly
/// one place.
pub trait StrategyFactory: Send + Sync {
    /// Create a fresh, full strategy for a client key.
    fn make(&self, client_key: &str) -> Arc<dyn RateLimiterStrategy>;

    /// Reconstruct a strategy from a snapshot, preserving its remaining
    /// count.
    fn restore(&self, snapshot: StrategySnapshot) -> Arc<dyn RateLimiterStrategy>;
}

/// Factory for [`TokenBucketStrategy`] instances.
///
/// Stateless beyond its two configuration parameters; cheap to clone and
/// share.
#[derive(Debug, Clone)]
pub struct TokenBucketFactory {
    capacity: u32,
    expiry_delay: Duration,
}

impl TokenBucketFactory {
    /// Create a factory producing buckets of `capacity` permits that expire
    /// `expiry_delay` after creation.
    pub fn new(capacity: u32, expiry_delay: Duration) -> Self {
        Self {
            capacity,
            expiry_delay,
        }
    }

    /// Configured bucket capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Configured expiry delay.
    pub fn expiry_delay(&self) -> Duration {
        self.expiry_delay
    }
}

impl Default for TokenBucketFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_EXPIRY_DELAY)
    }
}

impl StrategyFactory for TokenBucketFactory {
    fn make(&self, client_key: &str) -> Arc<dyn RateLimiterStrategy> {
        Arc::new(TokenBucketStrategy::new(
            client_key,
            self.capacity,
            self.expiry_delay,
        ))
    }

    fn restore(&self, snapshot: StrategySnapshot) -> Arc<dyn RateLimiterStrategy> {
        Arc::new(TokenBucketStrategy::from_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_produces_full_bucket() {
        let factory = TokenBucketFactory::new(5, Duration::from_secs(15));
        let strategy = factory.make("10.0.0.1");

        assert_eq!(strategy.client_key(), "10.0.0.1");
        assert_eq!(strategy.capacity(), 5);
        assert_eq!(strategy.remaining(), 5);
        assert_eq!(strategy.expiry_delay(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_parameters() {
        let factory = TokenBucketFactory::default();
        assert_eq!(factory.capacity(), 60);
        assert_eq!(factory.expiry_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_restore_preserves_remaining() {
        let factory = TokenBucketFactory::default();
        let strategy = factory.make("10.0.0.1");
        strategy.consume().unwrap();

        let restored = factory.restore(strategy.snapshot());
        assert_eq!(restored.remaining(), 59);
        assert_eq!(restored.snapshot(), strategy.snapshot());
    }
}
