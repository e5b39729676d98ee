//! Signal gateway
//!
//! Turns inbound trade signals into ledger calls: normalizes the bot id,
//! enforces buy windows on opening actions, and resolves the trade price
//! from the signal or the quote cache.

mod types;
mod window;

pub use types::{
    normalize_account_id, GatewayCommand, GatewayOutcome, TradeSignal, ValidSignal,
    DEFAULT_REASON,
};
pub use window::{BuyWindow, WindowParseError};

use crate::ledger::{Ledger, LedgerError};
use crate::quotes::{PriceLookup, QuoteCache};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Dispatches signals and reset requests to the ledger
pub struct SignalGateway {
    ledger: Arc<Ledger>,
    quotes: Arc<QuoteCache>,
    timezone: Tz,
    windows: HashMap<String, BuyWindow>,
}

impl SignalGateway {
    /// Build a gateway, parsing every account's buy hours up front
    pub fn new(
        ledger: Arc<Ledger>,
        quotes: Arc<QuoteCache>,
        timezone: Tz,
    ) -> Result<Self, WindowParseError> {
        let mut windows = HashMap::new();
        for id in ledger.account_ids() {
            let hours = ledger
                .settings(id)
                .map(|s| s.buy_hours.as_str())
                .unwrap_or_default();
            windows.insert(id.clone(), BuyWindow::parse(hours)?);
        }
        Ok(Self {
            ledger,
            quotes,
            timezone,
            windows,
        })
    }

    /// Handle one line of gateway input
    pub async fn dispatch(
        &self,
        command: GatewayCommand,
        now: DateTime<Utc>,
    ) -> Result<GatewayOutcome, LedgerError> {
        match command {
            GatewayCommand::Signal(signal) => self.handle(&signal, now).await,
            GatewayCommand::Reset { account, token } => self.reset(&account, token).await,
        }
    }

    /// Execute a trade signal at `now`
    pub async fn handle(
        &self,
        signal: &TradeSignal,
        now: DateTime<Utc>,
    ) -> Result<GatewayOutcome, LedgerError> {
        let valid = signal.validate()?;
        let window = self
            .windows
            .get(&valid.account_id)
            .ok_or_else(|| LedgerError::UnknownAccount(valid.account_id.clone()))?;

        if valid.action.is_opening() {
            let local = now.with_timezone(&self.timezone).time();
            if !window.allows(local) {
                let hours = self.ledger.settings(&valid.account_id)?.buy_hours.clone();
                tracing::info!(
                    account = %valid.account_id,
                    action = %valid.action,
                    local_time = %local.format("%H:%M"),
                    "Signal outside buy window"
                );
                return Err(LedgerError::OutsideBuyWindow(hours));
            }
        }

        let price = match valid.price {
            Some(price) => price,
            None => self
                .quotes
                .price(&valid.symbol)
                .ok_or_else(|| LedgerError::PriceUnavailable(valid.symbol.clone()))?,
        };

        let side = valid.action.side();
        if valid.action.is_opening() {
            let position = self
                .ledger
                .open(&valid.account_id, &valid.symbol, side, price, &valid.reason, now)
                .await?;
            Ok(GatewayOutcome::Opened {
                account: valid.account_id,
                symbol: valid.symbol,
                position,
            })
        } else {
            let summary = self
                .ledger
                .close(&valid.account_id, &valid.symbol, side, price, &valid.reason, now)
                .await?;
            Ok(GatewayOutcome::Closed {
                account: valid.account_id,
                summary,
            })
        }
    }

    /// Clear an account's kill switch
    pub async fn reset(&self, account: &str, token: Uuid) -> Result<GatewayOutcome, LedgerError> {
        let account_id = normalize_account_id(account);
        let next_token = self.ledger.manual_reset(&account_id, token).await?;
        Ok(GatewayOutcome::Reset {
            account: account_id,
            next_token,
        })
    }
}
