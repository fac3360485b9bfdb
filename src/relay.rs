//! HTTP client for the rate-limit status endpoint.
//!
//! The relay route does not read the counter store itself; it asks the
//! status endpoint of a (possibly remote) Hookgate instance.

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::RelayConfig;
use crate::error::Result;

/// Body returned by `GET /rate-limit-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub identifier: String,
    pub request_count: u32,
    pub remaining: u32,
    pub reset_time: i64,
    pub daily_limit: u32,
}

/// Client for a status endpoint.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    status_url: String,
}

impl RelayClient {
    pub fn new(status_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            status_url: status_url.into(),
        })
    }

    /// Build a client when a status URL is configured.
    pub fn from_config(config: &RelayConfig) -> Result<Option<Self>> {
        config
            .status_url
            .as_deref()
            .map(|url| Self::new(url, config.timeout()))
            .transpose()
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    /// Query the status of `identifier`, forwarding the caller's address headers.
    pub async fn fetch_status(
        &self,
        identifier: &str,
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
    ) -> Result<StatusPayload> {
        debug!(identifier = %identifier, url = %self.status_url, "Fetching rate limit status");

        let payload = self
            .client
            .get(&self.status_url)
            .header(AUTHORIZATION, format!("Bearer {}", identifier))
            .header("x-forwarded-for", forwarded_for.unwrap_or(""))
            .header("x-real-ip", real_ip.unwrap_or(""))
            .send()
            .await?
            .error_for_status()?
            .json::<StatusPayload>()
            .await?;

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_url() {
        let client = RelayClient::from_config(&RelayConfig::default()).unwrap();
        assert!(client.is_none());
    }

    #[test]
    fn test_from_config_with_url() {
        let config = RelayConfig {
            status_url: Some("http://127.0.0.1:8080/rate-limit-status".to_string()),
            ..Default::default()
        };
        let client = RelayClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.status_url(), "http://127.0.0.1:8080/rate-limit-status");
    }

    #[test]
    fn test_status_payload_shape() {
        let payload: StatusPayload = serde_json::from_value(serde_json::json!({
            "identifier": "u1",
            "requestCount": 3,
            "remaining": 7,
            "resetTime": 1700000000000i64,
            "dailyLimit": 10
        }))
        .unwrap();
        assert_eq!(payload.remaining, 7);
        assert_eq!(payload.daily_limit, 10);
    }

    #[tokio::test]
    async fn test_unreachable_status_endpoint_is_an_error() {
        // Port 9 (discard) is not expected to run an HTTP server
        let client = RelayClient::new("http://127.0.0.1:9/rate-limit-status", Duration::from_millis(500)).unwrap();
        assert!(client.fetch_status("u1", None, None).await.is_err());
    }
}
