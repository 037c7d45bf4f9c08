use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 120;
const DEFAULT_ROSTER_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

/// Application configuration with validation.
///
/// The backend URL and the public (anonymous) API key are mandatory; without
/// them the system is non-functional and startup fails with a clear error.
/// The administrative key is optional and only unlocks account provisioning
/// and password resets.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the hosted backend
    #[validate(url)]
    pub backend_url: String,

    /// Public (anonymous) API key sent with every request
    #[validate(length(min = 1))]
    pub anon_key: String,

    /// Administrative key for user provisioning; never sent on normal calls
    #[serde(default)]
    pub admin_key: Option<String>,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Liveness heartbeat period (seconds)
    #[serde(default = "default_heartbeat_interval_secs")]
    #[validate(custom = "validate_interval")]
    pub heartbeat_interval_secs: u64,

    /// Roster refresh period (seconds)
    #[serde(default = "default_roster_refresh_interval_secs")]
    #[validate(custom = "validate_interval")]
    pub roster_refresh_interval_secs: u64,

    /// Third-party endpoint used once per session to resolve the public IP
    #[serde(default = "default_ip_lookup_url")]
    #[validate(url)]
    pub ip_lookup_url: String,
}

impl AppConfig {
    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn roster_refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.roster_refresh_interval_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_roster_refresh_interval_secs() -> u64 {
    DEFAULT_ROSTER_REFRESH_INTERVAL_SECS
}

fn default_ip_lookup_url() -> String {
    DEFAULT_IP_LOOKUP_URL.to_string()
}

fn validate_interval(value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        let mut err = ValidationError::new("interval");
        err.message = Some("polling intervals must be greater than 0 seconds".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("pae_inventory={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: backend_url and anon_key have no defaults - they MUST be provided
    // via environment variables or a config file.
    let config = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for key in ["backend_url", "anon_key"] {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set APP__{} with the backend credentials.",
                key,
                key.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                key
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            backend_url: "https://backend.example.com".into(),
            anon_key: "anon".into(),
            admin_key: None,
            environment: "development".into(),
            log_level: default_log_level(),
            log_json: false,
            http_timeout_secs: default_http_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            roster_refresh_interval_secs: default_roster_refresh_interval_secs(),
            ip_lookup_url: default_ip_lookup_url(),
        }
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = base_config();
        cfg.heartbeat_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_backend_url_is_rejected() {
        let mut cfg = base_config();
        cfg.backend_url = "not a url".into();
        assert!(cfg.validate().is_err());
    }
}
