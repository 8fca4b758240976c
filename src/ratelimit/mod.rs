//! Rate limiting strategies and storage containers.

mod container;
mod factory;
mod memory;
mod redis;
mod strategy;

pub use container::RateLimiterContainer;
pub use factory::{StrategyFactory, TokenBucketFactory};
pub use memory::InMemoryContainer;
pub use redis::RedisContainer;
pub use strategy::{RateLimiterStrategy, StrategySnapshot, TokenBucketStrategy};
