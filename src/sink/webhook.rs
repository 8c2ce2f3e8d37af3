// src/sink/webhook.rs
//! Webhook sink - sends one HTTP POST notification per match

use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use super::EventSink;
use crate::config::WebhookConfig;
use crate::types::{LogEntry, MatchRecord};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

pub struct WebhookSink {
    client: Client,
    config: WebhookConfig,
    log_uri: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    log_uri: &'a str,
    #[serde(flatten)]
    record: &'a MatchRecord,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig, log_uri: String) -> Self {
        Self {
            client: Client::new(),
            config,
            log_uri,
        }
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&mut self, entry: &LogEntry) -> Result<()> {
        let record = MatchRecord::from_entry(entry);
        let payload = WebhookPayload {
            log_uri: &self.log_uri,
            record: &record,
        };

        let body = serde_json::to_vec(&payload)?;

        let timeout_secs = self.config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let mut req = self
            .client
            .post(&self.config.url)
            .timeout(Duration::from_secs(timeout_secs))
            .body(body.clone())
            .header("Content-Type", "application/json");

        // Sign the payload when a secret is configured
        if let Some(secret) = &self.config.secret {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| anyhow::anyhow!("HMAC init error: {:?}", e))?;
            mac.update(&body);
            let sig_hex = hex::encode(mac.finalize().into_bytes());
            req = req.header("X-CTSentinel-Signature", sig_hex);
        }

        let resp = req.send().await?;
        resp.error_for_status()?;

        debug!("Webhook notified about entry {}", entry.index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_entry() -> LogEntry {
        LogEntry {
            index: 42,
            kind: EntryKind::Certificate,
            subject_cn: Some("login.example.com".to_string()),
            issuer_cn: Some("Example CA".to_string()),
            dns_names: vec!["login.example.com".to_string()],
            serial: "01ff".to_string(),
            not_before: Some(1_700_000_000),
            not_after: Some(1_710_000_000),
            sha256: "deadbeef".to_string(),
            raw_der: vec![0x30, 0x82],
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = WebhookConfig {
            url: mock_server.uri(),
            secret: None,
            timeout_secs: Some(5),
        };

        let mut sink = WebhookSink::new(config, "https://log.example/a".to_string());
        sink.deliver(&sample_entry()).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("X-CTSentinel-Signature"));

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["log_uri"], "https://log.example/a");
        assert_eq!(body["log_index"], 42);
        assert_eq!(body["kind"], "certificate");
        assert_eq!(body["sha256"], "deadbeef");
        assert_eq!(body["crtsh_url"], "https://crt.sh/?sha256=deadbeef");
    }

    #[tokio::test]
    async fn test_webhook_signs_body_with_secret() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let config = WebhookConfig {
            url: mock_server.uri(),
            secret: Some("test_secret".to_string()),
            timeout_secs: Some(5),
        };

        let mut sink = WebhookSink::new(config, "https://log.example/a".to_string());
        sink.deliver(&sample_entry()).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let sig = requests[0]
            .headers
            .get("X-CTSentinel-Signature")
            .unwrap()
            .to_str()
            .unwrap();

        // Recompute over the exact body the server saw
        let mut mac = HmacSha256::new_from_slice(b"test_secret").unwrap();
        mac.update(&requests[0].body);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(sig, expected);
    }

    #[tokio::test]
    async fn test_webhook_surfaces_http_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let config = WebhookConfig {
            url: mock_server.uri(),
            secret: None,
            timeout_secs: Some(5),
        };

        let mut sink = WebhookSink::new(config, "https://log.example/a".to_string());
        assert!(sink.deliver(&sample_entry()).await.is_err());
    }
}
