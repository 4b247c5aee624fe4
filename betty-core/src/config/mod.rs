use config::{Config as Cfg, Environment, File};
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

use crate::observability::LogFormat;
use crate::retry::RetryConfig;

/// Client settings. Every field has a default so an empty environment still
/// produces a usable configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub google_link: GoogleLinkSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    /// Backend base URL, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    concat!("betty-client/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..Default::default()
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Polling budget while waiting for the user to finish the Google consent flow.
#[derive(Debug, Deserialize, Clone)]
pub struct GoogleLinkSettings {
    #[serde(default = "default_link_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_link_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_link_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

impl Default for GoogleLinkSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_link_initial_interval_ms(),
            max_interval_ms: default_link_max_interval_ms(),
            max_elapsed_secs: default_link_max_elapsed_secs(),
        }
    }
}

fn default_link_initial_interval_ms() -> u64 {
    1_000
}

fn default_link_max_interval_ms() -> u64 {
    5_000
}

fn default_link_max_elapsed_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    /// Bearer token used to seed the token store (console and tests only).
    #[serde(default)]
    pub token: Option<Secret<String>>,
}

impl Settings {
    /// Load from an optional `betty.{yaml,toml,json}` file and `BETTY__*`
    /// environment variables, e.g. `BETTY__API__BASE_URL`.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let settings = Cfg::builder()
            .add_source(File::with_name("betty").required(false))
            .add_source(
                Environment::with_prefix("BETTY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        let settings = Settings::load().expect("defaults should load");
        assert_eq!(settings.api.request_timeout(), Duration::from_secs(15));
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(settings.auth.token.is_none());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            std::env::set_var("BETTY__API__BASE_URL", "https://api.example.test");
            std::env::set_var("BETTY__API__REQUEST_TIMEOUT_SECS", "5");
            std::env::set_var("BETTY__AUTH__TOKEN", "secret-token");
        }

        let settings = Settings::load();

        unsafe {
            std::env::remove_var("BETTY__API__BASE_URL");
            std::env::remove_var("BETTY__API__REQUEST_TIMEOUT_SECS");
            std::env::remove_var("BETTY__AUTH__TOKEN");
        }

        let settings = settings.expect("settings should load");
        assert_eq!(settings.api.base_url, "https://api.example.test");
        assert_eq!(settings.api.request_timeout_secs, 5);
        assert_eq!(
            settings
                .auth
                .token
                .as_ref()
                .map(|t| t.expose_secret().as_str()),
            Some("secret-token")
        );
    }

    #[test]
    fn test_retry_settings_conversion() {
        let retry = RetrySettings {
            max_retries: 4,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        }
        .to_retry_config();
        assert_eq!(retry.max_retries, 4);
        assert_eq!(retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(retry.max_backoff, Duration::from_millis(100));
    }
}
