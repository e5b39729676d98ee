//! Ledger types

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Direction of a leveraged position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Profits when price rises
    Long,
    /// Profits when price falls
    Short,
}

impl Side {
    /// Action that opens a position on this side
    pub fn open_action(self) -> Action {
        match self {
            Side::Long => Action::Buy,
            Side::Short => Action::Short,
        }
    }

    /// Action that closes a position on this side
    pub fn close_action(self) -> Action {
        match self {
            Side::Long => Action::Sell,
            Side::Short => Action::Cover,
        }
    }

    /// P&L of `volume` units moving from `entry` to `price`
    pub fn pnl(self, entry: Decimal, price: Decimal, volume: Decimal) -> Decimal {
        match self {
            Side::Long => (price - entry) * volume,
            Side::Short => (entry - price) * volume,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Trade action carried by signals and trade records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
}

impl Action {
    /// Side this action operates on
    pub fn side(self) -> Side {
        match self {
            Action::Buy | Action::Sell => Side::Long,
            Action::Short | Action::Cover => Side::Short,
        }
    }

    /// Whether the action opens a new position
    pub fn is_opening(self) -> bool {
        matches!(self, Action::Buy | Action::Short)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Short => "short",
            Action::Cover => "cover",
        };
        f.write_str(s)
    }
}

impl FromStr for Action {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "short" => Ok(Action::Short),
            "cover" => Ok(Action::Cover),
            other => Err(LedgerError::InvalidInput(format!("unknown action: {other:?}"))),
        }
    }
}

/// An open leveraged position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: Uuid,
    /// Trade side
    pub side: Side,
    /// Units held; always positive while open
    pub volume: Decimal,
    /// Price the position was opened at
    pub entry_price: Decimal,
    /// Leverage applied at open
    pub leverage: u32,
    /// Cash committed from the balance
    pub margin_used: Decimal,
    /// Stop-loss distance from entry, in percent
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry, in percent
    pub take_profit_pct: Decimal,
    /// Fixed stop-loss trigger price
    pub stop_loss_price: Decimal,
    /// Fixed take-profit trigger price
    pub take_profit_price: Decimal,
    /// Open timestamp
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Notional size (margin times leverage)
    pub fn position_size(&self) -> Decimal {
        self.margin_used * Decimal::from(self.leverage)
    }

    /// Unrealized P&L at `price`
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.side.pnl(self.entry_price, price, self.volume)
    }
}

/// Append-only trade log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub symbol: String,
    pub reason: String,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub profit: Option<Decimal>,
    pub balance_after: Decimal,
    pub leverage: u32,
    #[serde(default)]
    pub avg_entry: Option<Decimal>,
    #[serde(default)]
    pub pl_pct: Option<Decimal>,
}

/// Per-account ledger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Cash not committed to margin
    pub balance: Decimal,
    /// Open positions by symbol
    #[serde(default)]
    pub positions: BTreeMap<String, Vec<Position>>,
    /// Trade history, oldest first
    #[serde(default)]
    pub trade_log: Vec<TradeRecord>,
}

/// Parameters for opening a position
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub side: Side,
    pub signal_price: Decimal,
    pub leverage: u32,
    /// Fraction of the current balance committed as margin
    pub margin_fraction: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_positions_per_symbol: usize,
    pub reason: String,
}

/// Result of closing one or more positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedSummary {
    pub symbol: String,
    pub side: Side,
    /// Number of positions closed
    pub positions: usize,
    pub total_volume: Decimal,
    pub total_margin: Decimal,
    /// Volume-weighted entry price
    pub avg_entry: Decimal,
    pub exit_price: Decimal,
    pub profit: Decimal,
    pub pl_pct: Decimal,
    pub balance_after: Decimal,
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed signal or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Balance cannot cover the required margin
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },
    /// Symbol already holds the maximum number of positions
    #[error("Position limit reached for {symbol}: max {max}")]
    PositionLimitReached { symbol: String, max: usize },
    /// Computed volume is not positive
    #[error("Invalid volume: {0}")]
    InvalidVolume(Decimal),
    /// Nothing to close on the requested side
    #[error("No {side} positions to close for {symbol}")]
    NoMatchingPositions { symbol: String, side: Side },
    /// Position id is not open on the symbol
    #[error("Position {0} is not open")]
    PositionNotFound(Uuid),
    /// No usable price for the symbol
    #[error("No price available for {0}")]
    PriceUnavailable(String),
    /// Kill switch blocks new positions
    #[error("Trading halted for account {0}: kill switch active")]
    TradingHalted(String),
    /// Account id is not configured
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
    /// Reset token did not match the current one
    #[error("Invalid kill switch reset token")]
    InvalidResetToken,
    /// Kill switch is still closing positions
    #[error("Kill switch liquidation still in progress")]
    LiquidationPending,
    /// Opening action outside the account's buy hours
    #[error("Opening positions is not allowed now; allowed windows: {0:?}")]
    OutsideBuyWindow(String),
    /// Store load or save failed
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
