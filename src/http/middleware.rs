//! Request admission middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use crate::ratelimit::{RateLimiterContainer, StrategyFactory};

/// Shared state for the rate limiting middleware.
///
/// Holds the container and factory chosen at startup. Built once before
/// serving begins and immutable during traffic; the middleware keeps no
/// other state across requests.
#[derive(Clone)]
pub struct RateLimitState {
    container: Arc<dyn RateLimiterContainer>,
    factory: Arc<dyn StrategyFactory>,
}

impl RateLimitState {
    /// Bind a container and factory into middleware state.
    pub fn new(container: Arc<dyn RateLimiterContainer>, factory: Arc<dyn StrategyFactory>) -> Self {
        Self { container, factory }
    }
}

/// Rate limiting middleware.
///
/// Apply with `axum::middleware::from_fn_with_state(state, rate_limit)` on
/// a router served with connect info, so the peer address is available as
/// the client key.
///
/// Requests from clients with remaining budget are forwarded unchanged.
/// Exhausted clients receive 429 with a JSON body; storage failures become
/// 500 responses and never terminate the process.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ConnectInfo(addr)) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .copied()
    else {
        error!("Request has no peer address; serve the router with connect info");
        return internal_error();
    };
    let client_key = addr.to_string();

    match state.container.has(&client_key).await {
        Ok(true) => {}
        Ok(false) => {
            let strategy = state.factory.make(&client_key);
            if let Err(e) = state.container.insert(&client_key, strategy).await {
                error!(key = %client_key, error = %e, "Failed to create limiter entry");
                return internal_error();
            }
        }
        Err(e) => {
            error!(key = %client_key, operation = "has", error = %e, "Storage backend failure");
            return internal_error();
        }
    }

    match state.container.consume(&client_key).await {
        Ok(()) => next.run(request).await,
        Err(e) if e.is_rejection() => {
            debug!(key = %client_key, "Rate limit exceeded");
            too_many_requests()
        }
        Err(e) => {
            error!(key = %client_key, operation = "consume", error = %e, "Storage backend failure");
            internal_error()
        }
    }
}

fn too_many_requests() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "message": "Too Many Requests" })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
