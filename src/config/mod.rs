//! Configuration management for the hedge trimmer.
//!
//! Loads settings from environment variables and config files.

use crate::error::TrimError;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instrument and cycle timing
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Trim threshold and close retry policy
    #[serde(default)]
    pub trim: TrimConfig,
    /// Logging verbosity flags
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Paper broker settings used by the binary
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Instrument to monitor (e.g., "EURUSD")
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Seconds between monitoring cycles (>= 1)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Minimum seconds between periodic status lines
    #[serde(default = "default_status_log_interval")]
    pub status_log_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimConfig {
    /// Fraction of losing loss the winning profit must cover, and the fraction
    /// of each losing position's volume closed on a trim. Range (0.1, 0.95].
    #[serde(default = "default_trim_fraction")]
    pub trim_fraction: Decimal,
    /// Maximum close attempts per position (1-10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff unit between close attempts, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log per-position priority metrics on every trim
    #[serde(default)]
    pub detailed: bool,
    /// Log broker position open/close notifications
    #[serde(default = "default_true")]
    pub log_position_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting bid price for the paper book
    #[serde(default = "default_initial_price")]
    pub initial_price: Decimal,
    /// Price change applied every interval (0 = static price)
    #[serde(default = "default_price_step")]
    pub price_step: Decimal,
    /// Open a demo hedged book on startup
    #[serde(default = "default_true")]
    pub seed_demo_book: bool,
}

// Default value functions
fn default_symbol() -> String {
    "EURUSD".to_string()
}

fn default_check_interval() -> u64 {
    5
}

fn default_status_log_interval() -> u64 {
    60
}

fn default_trim_fraction() -> Decimal {
    Decimal::new(75, 2) // 0.75
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1s x attempt number
}

fn default_true() -> bool {
    true
}

fn default_initial_price() -> Decimal {
    Decimal::new(11150, 4) // 1.1150
}

fn default_price_step() -> Decimal {
    Decimal::new(5, 4) // 5 pips
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("HT"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    ///
    /// An invalid configuration is fatal: the monitor must not be started.
    pub fn validate(&self) -> std::result::Result<(), TrimError> {
        ensure(
            !self.monitor.symbol.trim().is_empty(),
            "symbol must not be empty",
        )?;

        ensure(
            self.monitor.check_interval_secs >= 1,
            "check_interval_secs must be >= 1",
        )?;

        ensure(
            self.trim.trim_fraction > Decimal::new(1, 1)
                && self.trim.trim_fraction <= Decimal::new(95, 2),
            "trim_fraction must be greater than 0.1 and at most 0.95",
        )?;

        ensure(
            (1..=10).contains(&self.trim.max_retries),
            "max_retries must be between 1 and 10",
        )?;

        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> std::result::Result<(), TrimError> {
    if condition {
        Ok(())
    } else {
        Err(TrimError::Config(message.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            trim: TrimConfig::default(),
            logging: LoggingConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            check_interval_secs: default_check_interval(),
            status_log_interval_secs: default_status_log_interval(),
        }
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            trim_fraction: default_trim_fraction(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            detailed: false,
            log_position_events: default_true(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_price: default_initial_price(),
            price_step: default_price_step(),
            seed_demo_book: default_true(),
        }
    }
}
