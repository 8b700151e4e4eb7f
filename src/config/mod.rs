//! Configuration management for the margin lender.
//!
//! Loads settings from environment variables and an optional config file.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// KuCoin API credentials
    #[serde(default)]
    pub kucoin: KucoinConfig,
    /// Lending policy (rate floor, reserve, term)
    #[serde(default)]
    pub lending: LendingConfig,
    /// Backoff, polling, and timeout intervals
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KucoinConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// API secret for request signing
    #[serde(default)]
    pub api_secret: String,
    /// API passphrase (itself signed under key version 2)
    #[serde(default)]
    pub api_passphrase: String,
    /// REST endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingConfig {
    /// Lowest daily interest rate the bot will offer at. Required; a lend
    /// offer is never placed below this floor.
    #[serde(default)]
    pub min_daily_rate: Decimal,
    /// USDT kept back in the main account and never lent out
    #[serde(default)]
    pub reserved_amount: Decimal,
    /// Lending term in days
    #[serde(default = "default_term_days")]
    pub term_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after a failed balance fetch
    #[serde(default = "default_balance_retry_secs")]
    pub balance_retry_secs: u64,
    /// Wait when the lendable amount is below the exchange minimum
    /// (balance accrues over time, so this one is long)
    #[serde(default = "default_insufficient_balance_wait_secs")]
    pub insufficient_balance_wait_secs: u64,
    /// Wait after a failed rate fetch
    #[serde(default = "default_rate_retry_secs")]
    pub rate_retry_secs: u64,
    /// Interval between fill-status polls on an open order
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Total time to wait for a fill before cancelling. Must exceed the
    /// poll interval; the default gives 30 polls per wait window.
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,
    /// Wait between cancel attempts
    #[serde(default = "default_cancel_retry_secs")]
    pub cancel_retry_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.kucoin.com".to_string()
}

fn default_term_days() -> u32 {
    7
}

fn default_balance_retry_secs() -> u64 {
    1
}

fn default_insufficient_balance_wait_secs() -> u64 {
    300
}

fn default_rate_retry_secs() -> u64 {
    1
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_fill_timeout_secs() -> u64 {
    300
}

fn default_cancel_retry_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from environment variables and an optional file.
    ///
    /// Environment variables use the `LENDER` prefix with `__` separators,
    /// e.g. `LENDER__KUCOIN__API_KEY` or `LENDER__LENDING__MIN_DAILY_RATE`.
    pub fn load(file: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file_source =
            config::File::with_name(file.unwrap_or("config")).required(file.is_some());

        let config = config::Config::builder()
            .add_source(file_source)
            .add_source(config::Environment::default().separator("__").prefix("LENDER"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.kucoin.api_key.is_empty(), "kucoin.api_key is required");
        anyhow::ensure!(
            !self.kucoin.api_secret.is_empty(),
            "kucoin.api_secret is required"
        );
        anyhow::ensure!(
            !self.kucoin.api_passphrase.is_empty(),
            "kucoin.api_passphrase is required"
        );

        anyhow::ensure!(
            self.lending.min_daily_rate > Decimal::ZERO,
            "lending.min_daily_rate must be greater than 0"
        );
        anyhow::ensure!(
            self.lending.reserved_amount >= Decimal::ZERO,
            "lending.reserved_amount must not be negative"
        );
        anyhow::ensure!(self.lending.term_days >= 1, "lending.term_days must be >= 1");

        anyhow::ensure!(
            self.timing.poll_interval_secs > 0,
            "timing.poll_interval_secs must be greater than 0"
        );
        anyhow::ensure!(
            self.timing.fill_timeout_secs > self.timing.poll_interval_secs,
            "timing.fill_timeout_secs must exceed timing.poll_interval_secs"
        );

        Ok(())
    }
}

impl TimingConfig {
    pub fn balance_retry(&self) -> Duration {
        Duration::from_secs(self.balance_retry_secs)
    }

    pub fn insufficient_balance_wait(&self) -> Duration {
        Duration::from_secs(self.insufficient_balance_wait_secs)
    }

    pub fn rate_retry(&self) -> Duration {
        Duration::from_secs(self.rate_retry_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_secs)
    }

    pub fn cancel_retry(&self) -> Duration {
        Duration::from_secs(self.cancel_retry_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kucoin: KucoinConfig::default(),
            lending: LendingConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for KucoinConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
            base_url: default_base_url(),
        }
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            min_daily_rate: Decimal::ZERO,
            reserved_amount: Decimal::ZERO,
            term_days: default_term_days(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            balance_retry_secs: default_balance_retry_secs(),
            insufficient_balance_wait_secs: default_insufficient_balance_wait_secs(),
            rate_retry_secs: default_rate_retry_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            fill_timeout_secs: default_fill_timeout_secs(),
            cancel_retry_secs: default_cancel_retry_secs(),
        }
    }
}
