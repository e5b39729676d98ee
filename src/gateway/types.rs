//! Gateway types

use crate::ledger::{Action, ClosedSummary, LedgerError, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason recorded when a signal carries none
pub const DEFAULT_REASON: &str = "TradingView signal";

/// Inbound trade signal as received from an alerting system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Bot / account identity, e.g. "Coinbot 1.0"
    #[serde(alias = "account")]
    pub bot: String,
    pub action: String,
    pub symbol: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A signal that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSignal {
    pub account_id: String,
    pub action: Action,
    pub symbol: String,
    pub price: Option<Decimal>,
    pub reason: String,
}

/// Map a bot label onto an account id: "Coinbot 1.0" becomes "1.0"
pub fn normalize_account_id(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered.strip_prefix("coinbot").unwrap_or(&lowered);
    stripped.chars().filter(|c| !c.is_whitespace()).collect()
}

impl TradeSignal {
    /// Normalize and validate the signal shape
    pub fn validate(&self) -> Result<ValidSignal, LedgerError> {
        let account_id = normalize_account_id(&self.bot);
        if account_id.is_empty() {
            return Err(LedgerError::InvalidInput("missing bot".into()));
        }

        let action: Action = self.action.parse()?;

        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(LedgerError::InvalidInput("missing symbol".into()));
        }

        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(LedgerError::InvalidInput(format!(
                    "price must be positive, got {price}"
                )));
            }
        }

        let reason = self
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON)
            .to_string();

        Ok(ValidSignal {
            account_id,
            action,
            symbol,
            price: self.price,
            reason,
        })
    }
}

/// One line of gateway input
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayCommand {
    /// Open or close positions
    Signal(TradeSignal),
    /// Clear an active kill switch
    Reset { account: String, token: Uuid },
}

/// What the gateway did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GatewayOutcome {
    Opened {
        account: String,
        symbol: String,
        position: Position,
    },
    Closed {
        account: String,
        summary: ClosedSummary,
    },
    Reset {
        account: String,
        next_token: Uuid,
    },
}
