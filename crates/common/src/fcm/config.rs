use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const FCM_API_BASE_URL: &str = "https://fcm.googleapis.com";

/// Firebase Cloud Messaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// Google service account key (JSON) used to mint OAuth access tokens
    pub service_account_key_path: Option<String>,
    /// Pre-issued access token, used when no service account key is configured
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub api_base_url: String,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            service_account_key_path: None,
            access_token: None,
            request_timeout_secs: 10,
            api_base_url: FCM_API_BASE_URL.to_string(),
        }
    }
}

impl FcmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP v1 send endpoint for the configured project
    pub fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.api_base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}
