//! Tollgate - Per-Client HTTP Rate Limiting Middleware
//!
//! This crate implements a per-client request admission controller. Each
//! client (identified by its remote address) is given a fixed-size permit
//! bucket that drains as requests arrive and resets when the bucket's entry
//! expires. Limiter state can live in process memory or in a shared Redis
//! cache.

pub mod http;
pub mod ratelimit;
pub mod config;
pub mod error;
