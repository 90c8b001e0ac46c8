// ============================
// glasscast-backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are read once at startup from a TOML file merged with
//! `GLASSCAST_`-prefixed environment variables. `rtmp_url` has no default:
//! a process without a destination must not start serving.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Prefix for environment overrides, e.g. `GLASSCAST_RTMP_URL`
pub const ENV_PREFIX: &str = "GLASSCAST_";
/// Config file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "glasscast.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Destination every unmanaged stream is sent to
    pub rtmp_url: String,
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Log level used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Queued status events per viewer before pushes to it are dropped
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// Interval between SSE keep-alive comments
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Promote a transient disconnect to permanent after this many quiet seconds
    #[serde(default)]
    pub reconnect_grace_secs: Option<u64>,
    /// Base URL of the platform session API; local demo mode when unset
    #[serde(default)]
    pub platform_api_url: Option<String>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subscriber_buffer() -> usize {
    32
}

fn default_keep_alive_secs() -> u64 {
    15
}

/// Command-line values; unset fields leave file and environment values alone
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_addr: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtmp_url: Option<String>,
}

/// Figment with the file and environment providers in precedence order
pub fn figment(config_path: impl AsRef<Path>) -> Figment {
    Figment::new()
        .merge(Toml::file(config_path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX))
}

impl Settings {
    /// Settings with every optional key at its default
    pub fn new(rtmp_url: impl Into<String>) -> Self {
        Self {
            rtmp_url: rtmp_url.into(),
            bind_addr: default_bind_addr(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            subscriber_buffer: default_subscriber_buffer(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_grace_secs: None,
            platform_api_url: None,
        }
    }

    /// Load settings from `config_path` and the environment
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::from_figment(figment(config_path))
    }

    /// Load settings with command-line overrides taking precedence
    pub fn load_with(config_path: impl AsRef<Path>, overrides: &Overrides) -> Result<Self, AppError> {
        Self::from_figment(figment(config_path).merge(Serialized::defaults(overrides)))
    }

    /// Extract and validate settings from a prepared figment
    pub fn from_figment(figment: Figment) -> Result<Self, AppError> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        let url = self.rtmp_url.trim();
        if url.is_empty() {
            return Err(AppError::Config("rtmp_url must be set".to_string()));
        }
        if !(url.starts_with("rtmp://") || url.starts_with("rtmps://")) {
            return Err(AppError::Config(format!(
                "rtmp_url must use rtmp:// or rtmps://, got {url}"
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(AppError::Config(format!("unknown log_level {}", self.log_level)));
        }
        if self.subscriber_buffer == 0 {
            return Err(AppError::Config("subscriber_buffer must be positive".to_string()));
        }
        if self.keep_alive_secs == 0 {
            return Err(AppError::Config("keep_alive_secs must be positive".to_string()));
        }
        if self.reconnect_grace_secs == Some(0) {
            return Err(AppError::Config("reconnect_grace_secs must be positive".to_string()));
        }
        if let Some(base) = &self.platform_api_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(AppError::Config(format!(
                    "platform_api_url must be an http(s) URL, got {base}"
                )));
            }
        }
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_grace(&self) -> Option<Duration> {
        self.reconnect_grace_secs.map(Duration::from_secs)
    }
}
