//! HTTP handlers: webhooks, rate-limit status, the status relay, and health.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::identity::{derive_identifier, header_str};
use super::AppState;
use crate::ratelimit::Decision;
use crate::webhooks::{
    verify_lemon_squeezy, ClerkEvent, LemonSqueezyEvent, ProUpgrade, SvixHeaders, SvixVerifier,
};

const PROCESSED: &str = "Webhook processed successfully";

/// Body of a 429 response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceeded {
    pub error: String,
    pub message: String,
    pub reset_time: i64,
}

/// Body of `GET /rate-limit-status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub identifier: String,
    pub request_count: u32,
    pub remaining: u32,
    pub reset_time: i64,
    pub daily_limit: u32,
}

/// Body of a successful relay check.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayVerdict {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: i64,
}

/// Generic JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

fn rate_limit_headers(limit: u32, remaining: u32, reset_time: i64) -> [(&'static str, String); 3] {
    [
        ("X-RateLimit-Limit", limit.to_string()),
        ("X-RateLimit-Remaining", remaining.to_string()),
        ("X-RateLimit-Reset", reset_time.to_string()),
    ]
}

fn too_many_requests(limit: u32, remaining: u32, reset_time: i64, message: String) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        rate_limit_headers(limit, remaining, reset_time),
        Json(RateLimitExceeded {
            error: "Rate limit exceeded".to_string(),
            message,
            reset_time,
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

fn storage_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Rate limit storage unavailable".to_string(),
        }),
    )
        .into_response()
}

/// Count the request against its identifier, or produce the rejection.
///
/// Storage failures fail closed with 503.
async fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<Decision, Response> {
    let identifier = derive_identifier(headers);

    match state.limiter.consume(&identifier).await {
        Ok(decision) if decision.allowed => {
            debug!(identifier = %identifier, remaining = decision.remaining, "Request allowed");
            Ok(decision)
        }
        Ok(decision) => {
            info!(identifier = %identifier, "Request rate limited");
            Err(too_many_requests(
                state.limiter.daily_limit(),
                decision.remaining,
                decision.reset_time,
                decision.message.unwrap_or_default(),
            ))
        }
        Err(e) => {
            error!(identifier = %identifier, error = %e, "Rate limit check failed");
            Err(storage_unavailable())
        }
    }
}

/// `POST /lemon-squeezy-webhook`
#[instrument(skip_all)]
pub async fn lemon_squeezy_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = enforce_rate_limit(&state, &headers).await {
        return rejection;
    }

    let Some(signature) = header_str(&headers, "x-signature") else {
        return (StatusCode::BAD_REQUEST, "Missing X-Signature header").into_response();
    };

    let Some(secret) = state.webhooks.lemon_squeezy_secret.as_deref() else {
        error!("Lemon Squeezy webhook secret is not configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook").into_response();
    };

    if let Err(e) = verify_lemon_squeezy(secret, &body, signature) {
        warn!(error = %e, "Rejected Lemon Squeezy webhook");
        return (StatusCode::BAD_REQUEST, "Invalid signature").into_response();
    }

    let event: LemonSqueezyEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unreadable Lemon Squeezy payload");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook").into_response();
        }
    };

    match event.order_created() {
        Ok(Some(order)) => {
            let upgrade = ProUpgrade {
                email: order.attributes.user_email,
                customer_id: order.attributes.customer_id.to_string(),
                order_id: order.id.to_string(),
                amount: order.attributes.total,
                upgraded_at: state.clock.now().timestamp_millis(),
            };
            match state.users.upgrade_to_pro(&upgrade).await {
                Ok(true) => info!(order_id = %upgrade.order_id, "Order applied"),
                Ok(false) => warn!(order_id = %upgrade.order_id, "Order for unknown user"),
                Err(e) => {
                    error!(error = %e, "Pro upgrade failed");
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook")
                        .into_response();
                }
            }
        }
        Ok(None) => debug!(event = %event.meta.event_name, "Ignoring Lemon Squeezy event"),
        Err(e) => {
            warn!(error = %e, "Malformed order_created payload");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error processing webhook").into_response();
        }
    }

    (StatusCode::OK, PROCESSED).into_response()
}

/// `POST /clerk-webhook`
#[instrument(skip_all)]
pub async fn clerk_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = enforce_rate_limit(&state, &headers).await {
        return rejection;
    }

    let Some(secret) = state.webhooks.clerk_secret.as_deref() else {
        error!("Clerk webhook secret is not configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error occurred").into_response();
    };

    let (Some(id), Some(timestamp), Some(signature)) = (
        header_str(&headers, "svix-id"),
        header_str(&headers, "svix-timestamp"),
        header_str(&headers, "svix-signature"),
    ) else {
        return (StatusCode::BAD_REQUEST, "Error occurred -- no svix headers").into_response();
    };

    let verifier = match SvixVerifier::new(secret) {
        Ok(verifier) => verifier,
        Err(e) => {
            error!(error = %e, "Clerk webhook secret is unusable");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error occurred").into_response();
        }
    };

    let svix = SvixHeaders {
        id,
        timestamp,
        signature,
    };
    if let Err(e) = verifier.verify(&svix, &body, state.clock.now()) {
        warn!(error = %e, svix_id = %id, "Rejected Clerk webhook");
        return (StatusCode::BAD_REQUEST, "Error occurred").into_response();
    }

    let event: ClerkEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Unreadable Clerk payload");
            return (StatusCode::BAD_REQUEST, "Error occurred").into_response();
        }
    };

    match event.user_created() {
        Ok(Some(user)) => {
            let Some(email) = user.primary_email() else {
                warn!(user_id = %user.id, "user.created without an email address");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error creating user").into_response();
            };
            if let Err(e) = state
                .users
                .sync_user(&user.id, email, &user.display_name())
                .await
            {
                error!(user_id = %user.id, error = %e, "Error creating user");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error creating user").into_response();
            }
        }
        Ok(None) => debug!(event = %event.event_type, "Ignoring Clerk event"),
        Err(e) => {
            warn!(error = %e, "Malformed user.created payload");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error creating user").into_response();
        }
    }

    (StatusCode::OK, PROCESSED).into_response()
}

/// `GET /rate-limit-status`
///
/// Reports today's bucket for the caller without counting the request.
pub async fn rate_limit_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let identifier = derive_identifier(&headers);

    let snapshot = match state.limiter.status(&identifier).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(identifier = %identifier, error = %e, "Rate limit status failed");
            return storage_unavailable();
        }
    };

    let daily_limit = state.limiter.daily_limit();
    (
        rate_limit_headers(daily_limit, snapshot.remaining, snapshot.reset_time),
        Json(StatusResponse {
            identifier,
            request_count: snapshot.request_count,
            remaining: snapshot.remaining,
            reset_time: snapshot.reset_time,
            daily_limit,
        }),
    )
        .into_response()
}

/// `GET|POST /api/rate-limit-check`
///
/// Asks the status endpoint whether the caller has attempts left.
pub async fn rate_limit_check(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let identifier = derive_identifier(&headers);

    let Some(relay) = state.relay.as_ref() else {
        error!("Relay status URL is not configured");
        return internal_error();
    };

    let status = match relay
        .fetch_status(
            &identifier,
            header_str(&headers, "x-forwarded-for"),
            header_str(&headers, "x-real-ip"),
        )
        .await
    {
        Ok(status) => status,
        Err(e) => {
            error!(identifier = %identifier, error = %e, "Rate limit check error");
            return internal_error();
        }
    };

    if status.remaining == 0 {
        return too_many_requests(
            status.daily_limit,
            status.remaining,
            status.reset_time,
            format!(
                "Daily rate limit of {} requests exceeded. Try again tomorrow.",
                status.daily_limit
            ),
        );
    }

    Json(RelayVerdict {
        allowed: true,
        remaining: status.remaining,
        reset_time: status.reset_time,
    })
    .into_response()
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hookgate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
