//! Application settings loaded from `config.toml`.
//!
//! The file carries the non-secret knobs (tax rate, terminal device, poll
//! interval) and the adjustment reason codes that are seeded on startup.
//! Secrets such as the terminal access token come from the environment.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/bookstore.sqlite?mode=rwc";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Sales tax in basis points (825 = 8.25%)
    #[serde(default)]
    pub tax_rate_bps: u32,
    /// Payment terminal connection settings
    pub terminal: TerminalSettings,
    /// Transaction status polling settings
    #[serde(default)]
    pub poller: PollerSettings,
    /// Reason codes accepted for manual stock corrections
    #[serde(default)]
    pub adjustment_reasons: Vec<AdjustmentReasonConfig>,
}

/// Payment terminal connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalSettings {
    /// Base URL of the terminal REST API
    pub base_url: String,
    /// Device that checkouts are pushed to
    pub device_id: String,
    /// ISO currency code for checkout amounts
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Upper bound for a single terminal call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TerminalSettings {
    /// Upper bound for a single terminal call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Transaction status polling settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    /// Seconds between polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl PollerSettings {
    /// Time between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Configuration for a single adjustment reason
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentReasonConfig {
    /// Numeric reason code stored on audit rows
    pub code: i64,
    /// Human-readable label
    pub label: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_interval_secs() -> u64 {
    5
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_settings(&contents)
}

/// Parses settings from TOML text and validates them.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    if settings.terminal.timeout_secs == 0 {
        return Err(Error::Config {
            message: "terminal.timeout_secs must be greater than zero".to_string(),
        });
    }
    if settings.poller.interval_secs == 0 {
        return Err(Error::Config {
            message: "poller.interval_secs must be greater than zero".to_string(),
        });
    }

    Ok(settings)
}

/// Loads settings from the default location (./config.toml)
pub fn load_default_settings() -> Result<Settings> {
    load_settings("config.toml")
}

/// Gets the database URL from the environment, falling back to a local `SQLite` file.
#[must_use]
pub fn database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Reads the terminal access token from the environment.
pub fn terminal_access_token() -> Result<String> {
    std::env::var("TERMINAL_ACCESS_TOKEN").map_err(|e| Error::Config {
        message: format!("TERMINAL_ACCESS_TOKEN not available: {e}"),
    })
}
