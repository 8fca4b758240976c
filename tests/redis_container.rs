//! Integration tests for the Redis-backed container.
//!
//! These require a local Redis server on the default port and are ignored
//! by default:
//!
//! ```text
//! cargo test --test redis_container -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use tollgate::error::TollgateError;
use tollgate::ratelimit::{
    RateLimiterContainer, RedisContainer, StrategyFactory, TokenBucketFactory,
};

const REDIS_URL: &str = "redis://127.0.0.1:6379";

async fn container(capacity: u32, delay: Duration) -> (RedisContainer, Arc<dyn StrategyFactory>) {
    let factory: Arc<dyn StrategyFactory> =
        Arc::new(TokenBucketFactory::new(capacity, delay));
    let container = RedisContainer::connect(REDIS_URL, Arc::clone(&factory))
        .await
        .expect("local Redis server required");
    (container, factory)
}

#[tokio::test]
#[ignore = "requires a local Redis server"]
async fn itest_insert_consume_delete() {
    let (container, factory) = container(3, Duration::from_secs(60)).await;
    let key = "itest:insert:10.0.0.1";

    container.delete(key).await.unwrap();
    assert!(!container.has(key).await.unwrap());

    container.insert(key, factory.make(key)).await.unwrap();
    assert!(container.has(key).await.unwrap());

    for _ in 0..3 {
        container.consume(key).await.unwrap();
    }
    let err = container.consume(key).await.unwrap_err();
    assert!(matches!(err, TollgateError::TooManyRequests));

    container.delete(key).await.unwrap();
    assert!(!container.has(key).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a local Redis server"]
async fn itest_consume_without_entry_is_noop() {
    let (container, _) = container(1, Duration::from_secs(60)).await;
    let key = "itest:unseen:10.0.0.2";

    container.delete(key).await.unwrap();
    assert!(container.consume(key).await.is_ok());
}

#[tokio::test]
#[ignore = "requires a local Redis server"]
async fn itest_remaining_count_survives_round_trips() {
    let (container, factory) = container(5, Duration::from_secs(60)).await;
    let key = "itest:roundtrip:10.0.0.3";

    container.delete(key).await.unwrap();
    container.insert(key, factory.make(key)).await.unwrap();

    // Each consume re-stores the decremented snapshot; the budget must
    // drain across independent fetch/modify/store cycles
    for _ in 0..5 {
        container.consume(key).await.unwrap();
    }
    assert!(container.consume(key).await.is_err());

    container.delete(key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a local Redis server"]
async fn itest_entry_evicted_after_delay() {
    let (container, factory) = container(5, Duration::from_millis(100)).await;
    let key = "itest:evict:10.0.0.4";

    container.delete(key).await.unwrap();
    container.insert(key, factory.make(key)).await.unwrap();
    assert!(container.has(key).await.unwrap());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!container.has(key).await.unwrap());
}
