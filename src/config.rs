//! Configuration types for margin-ledger

use crate::gateway::{normalize_account_id, BuyWindow};
use anyhow::{bail, Context};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub defaults: TradingSettings,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub quotes: QuoteConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Ledger-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Cash balance for accounts with no saved snapshot
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
    /// IANA timezone for calendar days and buy windows
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_starting_balance() -> Decimal {
    dec!(1000)
}
fn default_timezone() -> String {
    "America/Edmonton".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            timezone: default_timezone(),
        }
    }
}

/// Per-account trading parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradingSettings {
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Stop-loss distance from entry, in percent
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry, in percent
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    /// Daily equity drawdown that trips the kill switch, in percent
    #[serde(default = "default_kill_switch_pct")]
    pub kill_switch_pct: Decimal,
    /// Fraction of balance committed as margin per trade
    #[serde(default = "default_margin_fraction")]
    pub margin_fraction: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions_per_symbol: usize,
    /// Local-time windows where opening is allowed, e.g. "08:00-12:00, 22:00-02:00"
    #[serde(default = "default_buy_hours")]
    pub buy_hours: String,
}

fn default_leverage() -> u32 {
    5
}
fn default_stop_loss_pct() -> Decimal {
    dec!(2.5)
}
fn default_take_profit_pct() -> Decimal {
    dec!(3.0)
}
fn default_kill_switch_pct() -> Decimal {
    dec!(5.0)
}
fn default_margin_fraction() -> Decimal {
    dec!(0.05)
}
fn default_max_positions() -> usize {
    5
}
fn default_buy_hours() -> String {
    "00:00-23:59".to_string()
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            leverage: default_leverage(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            kill_switch_pct: default_kill_switch_pct(),
            margin_fraction: default_margin_fraction(),
            max_positions_per_symbol: default_max_positions(),
            buy_hours: default_buy_hours(),
        }
    }
}

impl TradingSettings {
    /// Check ranges; the error names the offending field
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.leverage < 1 {
            bail!("leverage must be at least 1");
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.take_profit_pct <= Decimal::ZERO {
            bail!("stop_loss_pct and take_profit_pct must be positive");
        }
        if self.kill_switch_pct < dec!(0.1) || self.kill_switch_pct > dec!(50) {
            bail!("kill_switch_pct must be within 0.1-50, got {}", self.kill_switch_pct);
        }
        if self.margin_fraction <= Decimal::ZERO || self.margin_fraction > Decimal::ONE {
            bail!("margin_fraction must be in (0, 1], got {}", self.margin_fraction);
        }
        if self.max_positions_per_symbol < 1 {
            bail!("max_positions_per_symbol must be at least 1");
        }
        BuyWindow::parse(&self.buy_hours)
            .with_context(|| format!("invalid buy_hours {:?}", self.buy_hours))?;
        Ok(())
    }
}

/// A configured trading account (one per bot)
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub leverage: Option<u32>,
    pub stop_loss_pct: Option<Decimal>,
    pub take_profit_pct: Option<Decimal>,
    pub kill_switch_pct: Option<Decimal>,
    pub margin_fraction: Option<Decimal>,
    pub max_positions_per_symbol: Option<usize>,
    pub buy_hours: Option<String>,
}

impl AccountConfig {
    /// Account with no overrides
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            leverage: None,
            stop_loss_pct: None,
            take_profit_pct: None,
            kill_switch_pct: None,
            margin_fraction: None,
            max_positions_per_symbol: None,
            buy_hours: None,
        }
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Effective settings: overrides layered on `defaults`
    pub fn settings(&self, defaults: &TradingSettings) -> TradingSettings {
        TradingSettings {
            leverage: self.leverage.unwrap_or(defaults.leverage),
            stop_loss_pct: self.stop_loss_pct.unwrap_or(defaults.stop_loss_pct),
            take_profit_pct: self.take_profit_pct.unwrap_or(defaults.take_profit_pct),
            kill_switch_pct: self.kill_switch_pct.unwrap_or(defaults.kill_switch_pct),
            margin_fraction: self.margin_fraction.unwrap_or(defaults.margin_fraction),
            max_positions_per_symbol: self
                .max_positions_per_symbol
                .unwrap_or(defaults.max_positions_per_symbol),
            buy_hours: self
                .buy_hours
                .clone()
                .unwrap_or_else(|| defaults.buy_hours.clone()),
        }
    }
}

/// Upper bound for debounce and quote age windows (one week)
pub const MAX_RISK_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Risk controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Seconds between risk ticks
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Continuous breach required before the kill switch fires
    #[serde(default = "default_debounce")]
    pub kill_switch_debounce_secs: u64,
    /// Quotes older than this suspend kill-switch evaluation
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_check_interval() -> u64 {
    2
}
fn default_debounce() -> u64 {
    300
}
fn default_max_price_age() -> u64 {
    600
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            kill_switch_debounce_secs: default_debounce(),
            max_price_age_secs: default_max_price_age(),
        }
    }
}

/// Quote source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    #[serde(default = "default_quote_url")]
    pub base_url: String,
    /// Per-symbol fetch timeout
    #[serde(default = "default_quote_timeout")]
    pub timeout_ms: u64,
    /// Symbols refreshed every tick even when no position holds them
    #[serde(default = "default_watch_symbols")]
    pub symbols: Vec<String>,
}

fn default_quote_url() -> String {
    crate::quotes::COINEX_API_URL.to_string()
}
fn default_quote_timeout() -> u64 {
    3000
}
fn default_watch_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_url(),
            timeout_ms: default_quote_timeout(),
            symbols: default_watch_symbols(),
        }
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: crate::telemetry::LogFormat,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: crate::telemetry::LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every account's effective settings and global values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.accounts.is_empty() {
            bail!("at least one [[accounts]] entry is required");
        }
        if self.ledger.starting_balance <= Decimal::ZERO {
            bail!("starting_balance must be positive");
        }
        if self.risk.check_interval_secs == 0 {
            bail!("check_interval_secs must be at least 1");
        }
        if self.risk.kill_switch_debounce_secs > MAX_RISK_WINDOW_SECS {
            bail!(
                "kill_switch_debounce_secs must be at most {}, got {}",
                MAX_RISK_WINDOW_SECS,
                self.risk.kill_switch_debounce_secs
            );
        }
        if self.risk.max_price_age_secs > MAX_RISK_WINDOW_SECS {
            bail!(
                "max_price_age_secs must be at most {}, got {}",
                MAX_RISK_WINDOW_SECS,
                self.risk.max_price_age_secs
            );
        }
        self.timezone()?;

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.id.trim().is_empty() {
                bail!("account id must not be empty");
            }
            // Signals are matched on the normalized bot name
            let normalized = normalize_account_id(&account.id);
            if normalized != account.id {
                bail!(
                    "account id {:?} is not in normalized form, use {:?}",
                    account.id,
                    normalized
                );
            }
            if !seen.insert(account.id.as_str()) {
                bail!("duplicate account id {:?}", account.id);
            }
            account
                .settings(&self.defaults)
                .validate()
                .with_context(|| format!("account {}", account.id))?;
        }
        Ok(())
    }

    /// Parsed ledger timezone
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.ledger
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("unknown timezone {:?}: {}", self.ledger.timezone, e))
    }
}
