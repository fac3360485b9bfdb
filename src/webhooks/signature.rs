//! Webhook signature verification.
//!
//! Lemon Squeezy signs the raw body with HMAC-SHA256 and sends the hex digest
//! in `X-Signature`. Clerk delivers through Svix, which signs
//! `"{svix-id}.{svix-timestamp}.{body}"` with a base64 key and sends one or
//! more `v1,<base64>` entries in `svix-signature`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{HookgateError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between the Svix timestamp and now, in seconds.
pub const SVIX_TOLERANCE_SECS: i64 = 5 * 60;

const SVIX_SECRET_PREFIX: &str = "whsec_";

fn keyed_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key)
        .map_err(|e| HookgateError::Signature(format!("invalid HMAC key: {}", e)))
}

/// Hex HMAC-SHA256 of `body`, as Lemon Squeezy computes it.
pub fn sign_lemon_squeezy(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = keyed_mac(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check an `X-Signature` header against the raw request body.
pub fn verify_lemon_squeezy(secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| HookgateError::Signature("signature is not valid hex".to_string()))?;

    let mut mac = keyed_mac(secret.as_bytes())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| HookgateError::Signature("signature mismatch".to_string()))
}

/// The three Svix delivery headers.
#[derive(Debug, Clone, Copy)]
pub struct SvixHeaders<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

/// Verifier for Svix-signed deliveries.
#[derive(Clone)]
pub struct SvixVerifier {
    key: Vec<u8>,
}

impl std::fmt::Debug for SvixVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvixVerifier").finish_non_exhaustive()
    }
}

impl SvixVerifier {
    /// Build a verifier from a `whsec_`-prefixed (or bare) base64 secret.
    pub fn new(secret: &str) -> Result<Self> {
        let encoded = secret.strip_prefix(SVIX_SECRET_PREFIX).unwrap_or(secret);
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| HookgateError::Signature("webhook secret is not valid base64".to_string()))?;
        Ok(Self { key })
    }

    fn mac(&self, id: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = keyed_mac(&self.key)?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    /// Produce a `v1,<base64>` signature entry.
    pub fn sign(&self, id: &str, timestamp: &str, body: &[u8]) -> Result<String> {
        let digest = self.mac(id, timestamp, body)?.finalize().into_bytes();
        Ok(format!("v1,{}", STANDARD.encode(digest)))
    }

    /// Verify a delivery against the clock reading `now`.
    pub fn verify(&self, headers: &SvixHeaders<'_>, body: &[u8], now: DateTime<Utc>) -> Result<()> {
        let sent_at: i64 = headers
            .timestamp
            .trim()
            .parse()
            .map_err(|_| HookgateError::Signature("invalid svix-timestamp".to_string()))?;

        if (now.timestamp() - sent_at).abs() > SVIX_TOLERANCE_SECS {
            return Err(HookgateError::Signature(
                "svix-timestamp outside tolerance".to_string(),
            ));
        }

        let mac = self.mac(headers.id, headers.timestamp.trim(), body)?;

        let matched = headers
            .signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(HookgateError::Signature("no matching svix signature".to_string()))
        }
    }
}
