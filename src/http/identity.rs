//! Rate-limit identifier derivation from request headers.

use axum::http::{header::AUTHORIZATION, HeaderMap};

/// Identifier used when a request carries neither a token nor an address.
pub const UNKNOWN_IP: &str = "unknown-ip";

/// Pick the identifier a request is counted against.
///
/// Precedence: a non-empty bearer token, then `x-forwarded-for`, then
/// `x-real-ip`, then [`UNKNOWN_IP`]. Header values are used whole.
pub fn derive_identifier(headers: &HeaderMap) -> String {
    bearer_token(headers)
        .or_else(|| header_str(headers, "x-forwarded-for"))
        .or_else(|| header_str(headers, "x-real-ip"))
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// The token of an `Authorization: Bearer <token>` header, if non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A trimmed, non-empty, visible-ASCII header value.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
