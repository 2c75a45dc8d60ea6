use crate::error::ClientError;
use config::{Config as Cfg, Environment, File, FileFormat};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Settings shared by every binary in the workspace.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint; tracing export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_service_name() -> String {
    "assistant-client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load `base.yaml` from `config_dir`, then overlay `APP_`-prefixed
/// environment variables (`APP_SECTION__KEY`).
pub fn load_layered<T: DeserializeOwned>(config_dir: &Path) -> Result<T, ClientError> {
    dotenvy::dotenv().ok();

    let settings = Cfg::builder()
        .add_source(File::from(config_dir.join("base.yaml")).required(true))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}

/// Deserialize settings from an in-memory YAML document.
pub fn from_yaml_str<T: DeserializeOwned>(yaml: &str) -> Result<T, ClientError> {
    let settings = Cfg::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}
