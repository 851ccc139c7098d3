use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Body posted to the webhook. Built fresh for every attempt and discarded
/// after the round trip; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryPayload {
    pub qr_data: String,
    pub timestamp: String,
    pub user_agent: String,
    pub telegram_data: Option<serde_json::Value>,
}

impl DeliveryPayload {
    pub fn new(qr_data: impl Into<String>, telegram_data: Option<serde_json::Value>) -> Self {
        Self {
            qr_data: qr_data.into(),
            timestamp: Utc::now().to_rfc3339(),
            user_agent: client_ident(),
            telegram_data,
        }
    }
}

fn client_ident() -> String {
    format!(
        "qrlens/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("network failure: {0}")]
    Network(String),

    #[error("no webhook endpoint configured")]
    NotConfigured,
}

impl DeliveryError {
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::Server { status, .. } => format!("Server error: HTTP {status}."),
            DeliveryError::Timeout => "The request timed out.".into(),
            DeliveryError::Network(_) => "Network error. Check your connection.".into(),
            DeliveryError::NotConfigured => "No webhook URL is configured.".into(),
        }
    }
}

/// Posts decoded payloads to the configured webhook. Exactly one attempt
/// per call; retrying is a user action, never automatic.
#[derive(Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    send_timeout: Duration,
}

impl DeliveryClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            send_timeout: SEND_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_timeout(send_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_timeout,
        }
    }

    /// One POST, classified outcome. The response body is read for logging
    /// and error reporting but never parsed.
    pub async fn send(
        &self,
        url: &str,
        payload: &DeliveryPayload,
    ) -> Result<String, DeliveryError> {
        if url.trim().is_empty() {
            return Err(DeliveryError::NotConfigured);
        }

        info!("delivering scan payload to {url}");

        let response = self
            .client
            .post(url)
            .timeout(self.send_timeout)
            .json(payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            info!("webhook accepted payload: HTTP {status}, body {body:?}");
            Ok(body)
        } else {
            Err(DeliveryError::Server {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Diagnostic HEAD probe. Failures are logged only; an unreachable
    /// webhook must never block the scanner.
    pub async fn check_availability(&self, url: &str) -> Option<u16> {
        if url.trim().is_empty() {
            return None;
        }

        match self
            .client
            .head(url)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                info!("webhook availability check: HTTP {}", response.status());
                Some(response.status().as_u16())
            }
            Err(err) => {
                warn!("webhook availability check failed: {err}");
                None
            }
        }
    }
}

fn classify_transport(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Network(err.to_string())
    }
}
