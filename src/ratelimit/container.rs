//! Storage abstraction for per-client limiter state.

use std::sync::Arc;

use async_trait::async_trait;

use super::strategy::RateLimiterStrategy;
use crate::error::Result;

/// Storage for per-client limiter strategies.
///
/// This trait abstracts over the in-memory and Redis-backed containers so
/// the middleware can work with either. A container owns the strategies it
/// holds and arranges for each entry to be removed automatically once its
/// strategy's expiry delay elapses.
#[async_trait]
pub trait RateLimiterContainer: Send + Sync {
    /// Whether an entry currently exists for the client key.
    async fn has(&self, client_key: &str) -> Result<bool>;

    /// Take one permit from the client's strategy.
    ///
    /// A key without an entry is never rate limited: the call is a no-op
    /// success until [`insert`](RateLimiterContainer::insert) creates state
    /// for it.
    async fn consume(&self, client_key: &str) -> Result<()>;

    /// Store a strategy for a client key, replacing any prior entry and
    /// cancelling its pending expiry.
    async fn insert(
        &self,
        client_key: &str,
        strategy: Arc<dyn RateLimiterStrategy>,
    ) -> Result<()>;

    /// Remove the entry for a client key. Idempotent; absent keys are not
    /// an error.
    async fn delete(&self, client_key: &str) -> Result<()>;
}
