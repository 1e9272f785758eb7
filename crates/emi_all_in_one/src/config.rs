use common::fcm::{FcmConfig, FCM_API_BASE_URL};
use common::http::{CorsConfig, HttpServerConfig};
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use ::config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // HTTP
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// CORS allowed origins (comma-separated, "*" for all, empty disables CORS)
    #[serde(default)]
    pub http_cors_allowed_origins: String,

    // PostgreSQL
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    #[serde(default = "default_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // NATS
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Stream (and subject prefix) for command acknowledgement events
    #[serde(default = "default_nats_acknowledgements_stream")]
    pub nats_acknowledgements_stream: String,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Firebase Cloud Messaging
    #[serde(default)]
    pub fcm_project_id: String,

    /// Service account key file used to mint access tokens
    #[serde(default)]
    pub fcm_service_account_key_path: Option<String>,

    /// Fallback pre-issued access token
    #[serde(default)]
    pub fcm_access_token: Option<String>,

    #[serde(default = "default_fcm_request_timeout_secs")]
    pub fcm_request_timeout_secs: u64,

    #[serde(default = "default_fcm_api_base_url")]
    pub fcm_api_base_url: String,

    // JWT
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: u64,

    // OpenTelemetry
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    #[serde(default = "default_closer_timeout_secs")]
    pub closer_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "emi".to_string()
}

fn default_postgres_username() -> String {
    "emi".to_string()
}

fn default_postgres_password() -> String {
    "emi".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "/home/emi/migrations/postgres".to_string()
}

fn default_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_acknowledgements_stream() -> String {
    "device_command_acks".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_fcm_request_timeout_secs() -> u64 {
    10
}

fn default_fcm_api_base_url() -> String {
    FCM_API_BASE_URL.to_string()
}

fn default_jwt_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_jwt_expiration_hours() -> u64 {
    24
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "emi-device-commands".to_string()
}

fn default_closer_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("EMI"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
        }
    }

    pub fn fcm(&self) -> FcmConfig {
        FcmConfig {
            project_id: self.fcm_project_id.clone(),
            service_account_key_path: non_blank(&self.fcm_service_account_key_path),
            access_token: non_blank(&self.fcm_access_token),
            request_timeout_secs: self.fcm_request_timeout_secs,
            api_base_url: self.fcm_api_base_url.clone(),
        }
    }

    pub fn http_server(&self) -> HttpServerConfig {
        let cors_config = if self.http_cors_allowed_origins.trim().is_empty() {
            None
        } else {
            Some(CorsConfig::from_comma_separated(
                &self.http_cors_allowed_origins,
            ))
        };

        HttpServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            cors_config,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
