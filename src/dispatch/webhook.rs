//! Webhook channel adapter.
//!
//! Delivers alert payloads as JSON POSTs, optionally signed with an HMAC
//! over the serialized body and a millisecond timestamp so receivers can
//! verify origin and freshness.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_middleware::ClientWithMiddleware;
use sha2::Sha256;
use url::Url;

use super::{channel::ChannelAdapter, error::DispatchError, payload::NotificationPayload};
use crate::models::rule::ChannelKind;

type HmacSha256 = Hmac<Sha256>;

/// Webhook deliveries over a retryable HTTP client.
pub struct WebhookAdapter {
    /// HTTP client with retry middleware.
    client: Arc<ClientWithMiddleware>,
    /// Shared signing secret; deliveries go unsigned when unset.
    secret: Option<String>,
}

impl WebhookAdapter {
    /// Creates a webhook adapter.
    pub fn new(client: Arc<ClientWithMiddleware>, secret: Option<String>) -> Self {
        Self { client, secret }
    }

    /// Signs a payload with the given secret. Returns the hex signature and
    /// the millisecond timestamp bound into it.
    pub fn sign_payload(
        &self,
        secret: &str,
        payload: &serde_json::Value,
    ) -> Result<(String, String), DispatchError> {
        // `HmacSha256::new_from_slice` accepts empty keys; reject them here.
        if secret.is_empty() {
            return Err(DispatchError::ConfigError("Invalid secret: cannot be empty.".to_string()));
        }

        let timestamp = Utc::now().timestamp_millis();

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| DispatchError::ConfigError(format!("Invalid secret: {e}")))?;

        let serialized_payload = serde_json::to_string(payload)
            .map_err(|e| DispatchError::InternalError(format!("Failed to serialize payload: {e}")))?;
        let message = format!("{serialized_payload}{timestamp}");
        mac.update(message.as_bytes());

        let signature = hex::encode(mac.finalize().into_bytes());
        Ok((signature, timestamp.to_string()))
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let url = Url::parse(&payload.destination).map_err(|e| {
            DispatchError::ConfigError(format!(
                "Invalid webhook destination {}: {e}",
                payload.destination
            ))
        })?;

        let body = payload.to_json();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );

        if let Some(secret) = &self.secret {
            let (signature, timestamp) = self.sign_payload(secret, &body)?;
            headers.insert(
                HeaderName::from_static("x-signature"),
                HeaderValue::from_str(&signature).map_err(|e| {
                    DispatchError::DeliveryFailed(format!("Invalid signature value: {e}"))
                })?,
            );
            headers.insert(
                HeaderName::from_static("x-timestamp"),
                HeaderValue::from_str(&timestamp).map_err(|e| {
                    DispatchError::DeliveryFailed(format!("Invalid timestamp value: {e}"))
                })?,
            );
        }

        let response = self.client.post(url).headers(headers).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::DeliveryFailed(format!(
                "Webhook request failed with status: {status}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mockito::Matcher;

    use super::*;
    use crate::models::rule::Severity;

    fn test_client() -> Arc<ClientWithMiddleware> {
        Arc::new(reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build())
    }

    fn test_payload(destination: &str) -> NotificationPayload {
        NotificationPayload {
            rule_name: "large transfers".into(),
            severity: Severity::Warning,
            transaction_hash: "0xt1".into(),
            event_ordinal: Some(0),
            triggered_at: Utc::now(),
            destination: destination.into(),
        }
    }

    #[test]
    fn test_sign_payload_is_hex_and_timestamped() {
        let adapter = WebhookAdapter::new(test_client(), Some("test-secret".into()));
        let (signature, timestamp) =
            adapter.sign_payload("test-secret", &serde_json::json!({"a": 1})).unwrap();

        assert!(hex::decode(&signature).is_ok(), "signature should be valid hex");
        assert!(timestamp.parse::<i64>().is_ok(), "timestamp should be valid i64");
    }

    #[test]
    fn test_sign_payload_rejects_empty_secret() {
        let adapter = WebhookAdapter::new(test_client(), None);
        let result = adapter.sign_payload("", &serde_json::json!({}));
        assert!(matches!(result.unwrap_err(), DispatchError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_send_includes_signature_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("X-Signature", Matcher::Regex("^[0-9a-f]{64}$".to_string()))
            .match_header("X-Timestamp", Matcher::Regex("^[0-9]+$".to_string()))
            .match_header("Content-Type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "rule_name": "large transfers",
                "transaction_hash": "0xt1"
            })))
            .with_status(200)
            .create_async()
            .await;

        let adapter = WebhookAdapter::new(test_client(), Some("top-secret".into()));
        adapter.send(&test_payload(&server.url())).await.unwrap();

        mock.assert();
    }

    #[tokio::test]
    async fn test_send_unsigned_when_no_secret() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("X-Signature", Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        let adapter = WebhookAdapter::new(test_client(), None);
        adapter.send(&test_payload(&server.url())).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_send_surfaces_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(500).create_async().await;

        let adapter = WebhookAdapter::new(test_client(), None);
        let err = adapter.send(&test_payload(&server.url())).await.unwrap_err();
        assert!(matches!(err, DispatchError::DeliveryFailed(_)));
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_destination() {
        let adapter = WebhookAdapter::new(test_client(), None);
        let err = adapter.send(&test_payload("not a url")).await.unwrap_err();
        assert!(matches!(err, DispatchError::ConfigError(_)));
    }
}
