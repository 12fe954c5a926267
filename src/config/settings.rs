//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section and field is optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::iconfont::DEFAULT_BASE_URL;
use crate::login::{LoginSettings, MAX_LOGIN_TIMEOUT};
use crate::mcp::format::OutputFormat;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// iconfont.cn API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Auto-login settings.
    #[serde(default)]
    pub login: LoginConfig,

    /// Icon download settings.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Tool output settings.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid api.base_url '{base_url}'. Must start with http:// or https://"
                ),
            });
        }

        for (name, value) in [
            ("api.timeout_ms", self.api.timeout_ms),
            ("login.timeout_ms", self.login.timeout_ms),
            ("login.poll_interval_ms", self.login.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{name} must be greater than zero"),
                });
            }
        }

        let max_login_ms = u64::try_from(MAX_LOGIN_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
        if self.login.timeout_ms > max_login_ms {
            return Err(ConfigError::ValidationError {
                message: format!("login.timeout_ms must be at most {max_login_ms}"),
            });
        }
        for (name, value) in [
            ("login.poll_interval_ms", self.login.poll_interval_ms),
            ("login.fallback_grace_ms", self.login.fallback_grace_ms),
        ] {
            if value > self.login.timeout_ms {
                return Err(ConfigError::ValidationError {
                    message: format!("{name} must not exceed login.timeout_ms"),
                });
            }
        }

        if OutputFormat::parse(&self.output.default_format).is_none() {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid output.default_format '{}'. Must be one of: markdown, json",
                    self.output.default_format
                ),
            });
        }

        Ok(())
    }
}

/// iconfont.cn API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Service origin.
    /// Default: `https://www.iconfont.cn`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl ApiConfig {
    /// Returns the request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Auto-login configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginConfig {
    /// Overall time allowed for the user to log in, in milliseconds.
    #[serde(default = "default_login_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between session checks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Wait before the first probe when the system browser is used.
    #[serde(default = "default_fallback_grace_ms")]
    pub fallback_grace_ms: u64,

    /// Chrome/Chromium/Edge executable. Searched for when unset.
    #[serde(default)]
    pub browser_executable: Option<PathBuf>,
}

impl LoginConfig {
    /// Converts to orchestrator settings.
    #[must_use]
    pub const fn settings(&self) -> LoginSettings {
        LoginSettings {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fallback_grace: Duration::from_millis(self.fallback_grace_ms),
        }
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_login_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fallback_grace_ms: default_fallback_grace_ms(),
            browser_executable: None,
        }
    }
}

const fn default_login_timeout_ms() -> u64 {
    120_000
}

const fn default_poll_interval_ms() -> u64 {
    3_000
}

const fn default_fallback_grace_ms() -> u64 {
    5_000
}

/// Icon download configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadConfig {
    /// Directories SVG files may be written into.
    /// Empty means the current working directory only.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
}

/// Tool output configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Format used when a tool call does not ask for one: "markdown" or "json".
    #[serde(default = "default_format")]
    pub default_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
        }
    }
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
