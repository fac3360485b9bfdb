//! HTTP ingress for webhooks and rate-limit queries.

mod handlers;
mod identity;
mod server;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::WebhookConfig;
use crate::ratelimit::{Clock, RateLimiter, SystemClock};
use crate::relay::RelayClient;
use crate::webhooks::UserDirectory;

pub use handlers::{
    ErrorResponse, HealthResponse, RateLimitExceeded, RelayVerdict, StatusResponse,
};
pub use identity::{bearer_token, derive_identifier, UNKNOWN_IP};
pub use server::HttpServer;

/// Shared state of every handler.
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub users: Arc<dyn UserDirectory>,
    pub webhooks: WebhookConfig,
    /// Status client for the relay route; the route answers 500 without it
    pub relay: Option<RelayClient>,
    /// Used for webhook timestamp tolerance checks
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        limiter: Arc<RateLimiter>,
        users: Arc<dyn UserDirectory>,
        webhooks: WebhookConfig,
    ) -> Self {
        Self {
            limiter,
            users,
            webhooks,
            relay: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_relay(mut self, relay: Option<RelayClient>) -> Self {
        self.relay = relay;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/lemon-squeezy-webhook", post(handlers::lemon_squeezy_webhook))
        .route("/clerk-webhook", post(handlers::clerk_webhook))
        .route("/rate-limit-status", get(handlers::rate_limit_status))
        .route(
            "/api/rate-limit-check",
            get(handlers::rate_limit_check).post(handlers::rate_limit_check),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
