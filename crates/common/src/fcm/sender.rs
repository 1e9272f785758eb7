use crate::domain::{CommandPayload, PushOutcome, PushSender};
use crate::fcm::{FcmAccessTokenProvider, FcmConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// HTTP v1 data message with high Android priority addressed to one device
pub fn build_message(push_token: &str, payload: &CommandPayload) -> Value {
    json!({
        "message": {
            "token": push_token,
            "data": payload.to_data_map(),
            "android": { "priority": "high" }
        }
    })
}

/// Classify an FCM response into a push outcome
pub fn outcome_from_response(status: StatusCode, body: Option<Value>) -> PushOutcome {
    if status.is_success() {
        let message_id = body
            .as_ref()
            .and_then(|b| b.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return PushOutcome::Accepted {
            message_id,
            raw_response: body,
        };
    }

    let detail = body
        .as_ref()
        .and_then(|b| b.pointer("/error/message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let error = match detail {
        Some(detail) => format!("FCM rejected message ({}): {}", status, detail),
        None => format!("FCM rejected message ({})", status),
    };
    PushOutcome::failed(error, body)
}

/// PushSender backed by the Firebase Cloud Messaging HTTP v1 API
pub struct FcmPushSender {
    http: reqwest::Client,
    tokens: Arc<dyn FcmAccessTokenProvider>,
    send_url: String,
}

impl FcmPushSender {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn FcmAccessTokenProvider>, send_url: String) -> Self {
        Self {
            http,
            tokens,
            send_url,
        }
    }

    /// HTTP client with the configured request timeout
    pub fn http_client(config: &FcmConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build FCM HTTP client")
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    #[instrument(skip(self, push_token, payload), fields(command = %payload.command))]
    async fn send(&self, push_token: &str, payload: &CommandPayload) -> PushOutcome {
        let access_token = match self.tokens.access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "could not obtain FCM access token");
                return PushOutcome::failed(format!("FCM authentication failed: {:#}", e), None);
            }
        };

        let response = match self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&build_message(push_token, payload))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("FCM send timed out");
                return PushOutcome::failed("FCM send timed out", None);
            }
            Err(e) => {
                warn!(error = %e, "FCM send failed");
                return PushOutcome::failed(format!("FCM send failed: {}", e), None);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());

        let outcome = outcome_from_response(status, body);
        debug!(status = %status, accepted = outcome.is_accepted(), "FCM responded");
        outcome
    }
}
