//! HTTP server and middleware.

mod middleware;
mod server;

pub use middleware::{rate_limit, RateLimitState};
pub use server::HttpServer;
