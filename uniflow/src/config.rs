//! Configuration module for UniFlow.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `UNIFLOW_DATA_DIR` | No | `<user data dir>/uniflow` | Directory holding the stored records |
//! | `UNIFLOW_POLL_INTERVAL_SECS` | No | 60 | Seconds between reminder evaluations (1 to 86400) |
//! | `UNIFLOW_TOAST_SECS` | No | 5 | Lifetime of in-app toasts (1 to 86400) |
//! | `UNIFLOW_PUSH_URL` | No | - | Push relay endpoint (enables the relay) |
//! | `GEMINI_API_KEY` | No | - | Gemini API key (falls back to `API_KEY`) |
//! | `UNIFLOW_GEMINI_MODEL` | No | `gemini-3-flash-preview` | Model used for imports and suggestions |
//! | `UNIFLOW_GEMINI_URL` | No | Google endpoint | Gemini API base URL |
//!
//! # Example
//!
//! ```no_run
//! use uniflow::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Data directory: {}", config.data_dir.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default seconds between reminder evaluations.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default toast lifetime in seconds.
const DEFAULT_TOAST_SECS: u64 = 5;

/// Upper bound for the poll interval and toast lifetime: one day.
const MAX_SECS: u64 = 86_400;

/// Directory name under the user data directory.
const DATA_DIR_NAME: &str = "uniflow";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine the user data directory.
    #[error("failed to determine user data directory")]
    NoDataDirectory,
}

/// Settings for the Gemini collaborator.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key, if one is configured.
    pub api_key: Option<String>,

    /// Model name, e.g. `gemini-3-flash-preview`.
    pub model: String,

    /// API base URL without a trailing slash.
    pub base_url: String,
}

/// Configuration for UniFlow.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `unisync_*.json` records and `permission.json`.
    pub data_dir: PathBuf,

    /// Period of the reminder timer.
    pub poll_interval: Duration,

    /// How long toasts stay on screen.
    pub toast_lifetime: Duration,

    /// Push relay endpoint. `None` disables the relay.
    pub push_url: Option<String>,

    /// Gemini settings.
    pub gemini: GeminiConfig,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `UNIFLOW_POLL_INTERVAL_SECS` or `UNIFLOW_TOAST_SECS` is set but is not
    ///   an integer between 1 and 86400
    /// - `UNIFLOW_DATA_DIR` is unset and the user data directory cannot be
    ///   determined
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: UNIFLOW_DATA_DIR (default: <data dir>/uniflow)
        let data_dir = match non_empty_var("UNIFLOW_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => BaseDirs::new()
                .ok_or(ConfigError::NoDataDirectory)?
                .data_dir()
                .join(DATA_DIR_NAME),
        };

        let poll_interval = Duration::from_secs(parse_positive_secs(
            "UNIFLOW_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?);
        let toast_lifetime =
            Duration::from_secs(parse_positive_secs("UNIFLOW_TOAST_SECS", DEFAULT_TOAST_SECS)?);

        let push_url = non_empty_var("UNIFLOW_PUSH_URL");

        // GEMINI_API_KEY wins over the generic API_KEY
        let api_key = non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("API_KEY"));
        let model =
            non_empty_var("UNIFLOW_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let base_url = non_empty_var("UNIFLOW_GEMINI_URL")
            .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            data_dir,
            poll_interval,
            toast_lifetime,
            push_url,
            gemini: GeminiConfig {
                api_key,
                model,
                base_url,
            },
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_positive_secs(key: &str, default: u64) -> Result<u64, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };

    let secs = val
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected positive integer, got '{val}'"),
        })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1 second".to_string(),
        });
    }
    if secs > MAX_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {MAX_SECS} seconds, got {secs}"),
        });
    }
    Ok(secs)
}
