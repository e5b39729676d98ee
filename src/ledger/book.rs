//! Multi-account ledger service
//!
//! Each account sits behind its own async mutex. Mutations run on a clone,
//! the clone is persisted, and only then replaces the in-memory state.

use super::{Account, ClosedSummary, LedgerError, OpenRequest, Position, Side};
use crate::config::{Config, TradingSettings};
use crate::quotes::PriceLookup;
use crate::risk::RiskState;
use crate::store::LedgerStore;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Ledger and kill switch state for one account
#[derive(Debug, Clone)]
pub struct AccountBook {
    pub account: Account,
    pub risk: RiskState,
}

/// All configured accounts
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    ids: Vec<String>,
    settings: HashMap<String, TradingSettings>,
    books: HashMap<String, Arc<Mutex<AccountBook>>>,
}

impl Ledger {
    /// Load every configured account from the store, seeding missing ones
    pub async fn from_config(store: Arc<dyn LedgerStore>, config: &Config) -> Result<Self, LedgerError> {
        let accounts = config
            .accounts
            .iter()
            .map(|a| (a.id.clone(), a.settings(&config.defaults)))
            .collect();
        Self::load(store, accounts, config.ledger.starting_balance).await
    }

    /// Load `accounts` from the store. Accounts with no snapshot start with
    /// `starting_balance` and are saved immediately.
    pub async fn load(
        store: Arc<dyn LedgerStore>,
        accounts: Vec<(String, TradingSettings)>,
        starting_balance: Decimal,
    ) -> Result<Self, LedgerError> {
        let mut ids = Vec::with_capacity(accounts.len());
        let mut settings = HashMap::with_capacity(accounts.len());
        let mut books = HashMap::with_capacity(accounts.len());

        for (id, account_settings) in accounts {
            let account = match store.load(&id).await? {
                Some(account) => {
                    info!(
                        account = %id,
                        balance = %account.balance,
                        open_positions = account.total_open(),
                        "Loaded account"
                    );
                    account
                }
                None => {
                    let account = Account::new(starting_balance);
                    store.save(&id, &account).await?;
                    info!(account = %id, balance = %starting_balance, "Seeded new account");
                    account
                }
            };

            let book = AccountBook {
                account,
                risk: RiskState::new(),
            };
            ids.push(id.clone());
            settings.insert(id.clone(), account_settings);
            books.insert(id, Arc::new(Mutex::new(book)));
        }

        Ok(Self {
            store,
            ids,
            settings,
            books,
        })
    }

    /// Configured account ids, in configuration order
    pub fn account_ids(&self) -> &[String] {
        &self.ids
    }

    pub fn settings(&self, account_id: &str) -> Result<&TradingSettings, LedgerError> {
        self.settings
            .get(account_id)
            .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))
    }

    pub(crate) fn book(&self, account_id: &str) -> Result<&Arc<Mutex<AccountBook>>, LedgerError> {
        self.books
            .get(account_id)
            .ok_or_else(|| LedgerError::UnknownAccount(account_id.to_string()))
    }

    pub(crate) fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Apply `f` to a copy of the account, persist it, then commit
    pub(crate) async fn commit<T>(
        &self,
        account_id: &str,
        book: &mut AccountBook,
        f: impl FnOnce(&mut Account) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut next = book.account.clone();
        let out = f(&mut next)?;
        if let Err(e) = self.store.save(account_id, &next).await {
            telemetry::increment(CounterMetric::PersistenceFailure, account_id);
            return Err(e.into());
        }
        book.account = next;
        record_account(account_id, &book.account);
        Ok(out)
    }

    /// Open a position on `symbol` at `price` using the account's settings
    pub async fn open(
        &self,
        account_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        let settings = self.settings(account_id)?;
        let request = OpenRequest {
            symbol: symbol.to_string(),
            side,
            signal_price: price,
            leverage: settings.leverage,
            margin_fraction: settings.margin_fraction,
            stop_loss_pct: settings.stop_loss_pct,
            take_profit_pct: settings.take_profit_pct,
            max_positions_per_symbol: settings.max_positions_per_symbol,
            reason: reason.to_string(),
        };

        let mut book = self.book(account_id)?.lock().await;
        if book.risk.trading_halted() {
            warn!(account = account_id, symbol, "Open rejected, kill switch active");
            return Err(LedgerError::TradingHalted(account_id.to_string()));
        }

        let position = self
            .commit(account_id, &mut book, |account| account.open_position(&request, now))
            .await?;
        info!(
            account = account_id,
            symbol,
            side = %side,
            price = %price,
            volume = %position.volume,
            margin = %position.margin_used,
            leverage = position.leverage,
            "Opened position"
        );
        Ok(position)
    }

    /// Close every `side` position on `symbol` at `price`
    pub async fn close(
        &self,
        account_id: &str,
        symbol: &str,
        side: Side,
        price: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ClosedSummary, LedgerError> {
        let mut book = self.book(account_id)?.lock().await;
        let summary = self
            .commit(account_id, &mut book, |account| {
                account.close_positions(symbol, side, price, reason, now)
            })
            .await?;
        info!(
            account = account_id,
            symbol,
            side = %side,
            positions = summary.positions,
            exit = %price,
            profit = %summary.profit,
            pl_pct = %summary.pl_pct,
            "Closed positions"
        );
        Ok(summary)
    }

    /// Copy of the account's ledger state
    pub async fn snapshot(&self, account_id: &str) -> Result<Account, LedgerError> {
        Ok(self.book(account_id)?.lock().await.account.clone())
    }

    /// Equity at the given prices
    pub async fn equity(&self, account_id: &str, prices: &dyn PriceLookup) -> Result<Decimal, LedgerError> {
        Ok(self.book(account_id)?.lock().await.account.equity(prices))
    }

    /// Copy of the account's kill switch state
    pub async fn risk_state(&self, account_id: &str) -> Result<RiskState, LedgerError> {
        Ok(self.book(account_id)?.lock().await.risk.clone())
    }

    /// Token the next manual reset must present
    pub async fn reset_token(&self, account_id: &str) -> Result<Uuid, LedgerError> {
        Ok(self.book(account_id)?.lock().await.risk.reset_token)
    }

    /// Clear the kill switch. Returns the token for the next reset.
    pub async fn manual_reset(&self, account_id: &str, token: Uuid) -> Result<Uuid, LedgerError> {
        let mut book = self.book(account_id)?.lock().await;
        match book.risk.manual_reset(token) {
            Ok(next) => {
                info!(account = account_id, "Kill switch manually reset");
                telemetry::set_gauge(GaugeMetric::KillSwitchActive, account_id, Decimal::ZERO);
                Ok(next)
            }
            Err(e) => {
                warn!(account = account_id, error = %e, "Kill switch reset rejected");
                Err(e)
            }
        }
    }
}

/// Publish balance and position count gauges
pub(crate) fn record_account(account_id: &str, account: &Account) {
    telemetry::set_gauge(GaugeMetric::Balance, account_id, account.balance);
    telemetry::set_gauge(
        GaugeMetric::OpenPositions,
        account_id,
        Decimal::from(account.total_open()),
    );
}
