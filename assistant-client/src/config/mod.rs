use client_core::config as core_config;
use client_core::retry::RetryConfig;
use client_core::ClientError;
use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct Settings {
    #[serde(default)]
    pub common: core_config::Config,
    #[serde(default)]
    pub auth: AuthSettings,
    #[validate(nested)]
    pub api: ApiSettings,
    #[validate(nested)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    #[validate(nested)]
    pub transfers: TransferSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    /// Bearer token issued by the backend. Usually supplied as `APP_AUTH__TOKEN`.
    pub token: Option<Secret<String>>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ApiSettings {
    #[validate(url(message = "api.base_url must be a valid URL"))]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
    /// Retries for idempotent REST calls (tag fetch, listing).
    #[serde(default = "default_api_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_api_max_retries() -> u32 {
    2
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct RealtimeSettings {
    #[validate(url(message = "realtime.url must be a valid URL"))]
    pub url: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_max_reconnect_attempts")]
    #[validate(range(min = 1, max = 50))]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,
    /// Randomise reconnect delays by up to 25%.
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl RealtimeSettings {
    pub fn reconnect_policy(&self) -> RetryConfig {
        RetryConfig {
            add_jitter: self.jitter,
            ..RetryConfig::exponential(
                self.max_reconnect_attempts,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TransferSettings {
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1, max = 32))]
    pub max_concurrent: usize,
    #[serde(default = "default_max_file_size_bytes")]
    #[validate(range(min = 1))]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_allowed_media_types")]
    #[validate(length(min = 1, message = "at least one media type must be allowed"))]
    pub allowed_media_types: Vec<String>,
    /// Pause between upload completion and the tag fetch.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_upload_chunk_bytes")]
    #[validate(range(min = 1024))]
    pub upload_chunk_bytes: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_file_size_bytes() -> u64 {
    5 * 1024 * 1024
}

pub fn default_allowed_media_types() -> Vec<String> {
    [
        "application/pdf",
        "image/png",
        "image/jpeg",
        "image/jpg",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.ms-excel",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_settle_delay_ms() -> u64 {
    1500
}

fn default_upload_chunk_bytes() -> usize {
    64 * 1024
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_file_size_bytes: default_max_file_size_bytes(),
            allowed_media_types: default_allowed_media_types(),
            settle_delay_ms: default_settle_delay_ms(),
            upload_chunk_bytes: default_upload_chunk_bytes(),
        }
    }
}

impl TransferSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Settings {
    /// Load `config/base.yaml` plus `APP_*` overrides and validate the result.
    pub fn load() -> Result<Self, ClientError> {
        let settings: Settings = core_config::load_layered(&configuration_directory()?)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ClientError> {
        let settings: Settings = core_config::from_yaml_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }
}

fn configuration_directory() -> Result<PathBuf, ClientError> {
    let base_path = std::env::current_dir()?;

    // Works from the workspace root and from the crate directory
    if base_path.ends_with("assistant-client") {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join("assistant-client").join("config"))
    }
}
