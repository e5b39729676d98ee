//! Background risk controller
//!
//! Every tick, for each account in turn: roll the local day, close positions
//! whose stop-loss or take-profit crossed, then feed equity to the kill
//! switch. Kill switch evaluation is skipped while quotes are stale. Each
//! account is persisted once per tick, and a failed save discards that
//! account's changes for the tick.

use super::exits::{scan_exits, ExitKind};
use super::kill_switch::{KillSwitchDecision, KillSwitchStatus};
use crate::config::Config;
use crate::ledger::{record_account, Account, ClosedSummary, Ledger, LedgerError, Side};
use crate::quotes::{PriceLookup, QuoteCache, QuoteSource};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Trade log reason for kill switch liquidations
pub const KILL_SWITCH_REASON: &str = "Kill Switch Triggered";

/// Risk controller timing and scope
#[derive(Debug, Clone)]
pub struct RiskControllerConfig {
    /// Time between ticks
    pub check_interval: Duration,
    /// How long a breach must persist before liquidation
    pub kill_switch_debounce: chrono::Duration,
    /// Quotes older than this suspend kill switch evaluation
    pub max_price_age: chrono::Duration,
    /// Per-symbol fetch timeout
    pub quote_timeout: Duration,
    /// Symbols refreshed even with no open position
    pub watch_symbols: Vec<String>,
    /// Zone that defines the calendar day
    pub timezone: Tz,
}

impl Default for RiskControllerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(2),
            kill_switch_debounce: chrono::Duration::seconds(300),
            max_price_age: chrono::Duration::seconds(600),
            quote_timeout: Duration::from_secs(3),
            watch_symbols: vec![],
            timezone: chrono_tz::America::Edmonton,
        }
    }
}

impl RiskControllerConfig {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            check_interval: Duration::from_secs(config.risk.check_interval_secs),
            kill_switch_debounce: window_secs(
                "kill_switch_debounce_secs",
                config.risk.kill_switch_debounce_secs,
            )?,
            max_price_age: window_secs("max_price_age_secs", config.risk.max_price_age_secs)?,
            quote_timeout: Duration::from_millis(config.quotes.timeout_ms),
            watch_symbols: config.quotes.symbols.clone(),
            timezone: config.timezone()?,
        })
    }
}

fn window_secs(name: &str, secs: u64) -> anyhow::Result<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("{name} out of range: {secs}"))
}

/// What one tick did across all accounts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub accounts: usize,
    pub stop_losses: usize,
    pub take_profits: usize,
    /// Batches closed by the kill switch
    pub liquidations: usize,
    pub kill_switches_tripped: usize,
    /// Accounts whose evaluation failed and was rolled back
    pub failures: usize,
    pub quotes_stale: bool,
}

#[derive(Debug, Default)]
struct AccountOutcome {
    stop_losses: usize,
    take_profits: usize,
    liquidations: usize,
    tripped: bool,
}

/// Result of closing everything on an account
#[derive(Debug, Default)]
struct Liquidation {
    closed: Vec<ClosedSummary>,
    failed: Vec<String>,
}

fn liquidate_all(account: &mut Account, prices: &dyn PriceLookup, now: DateTime<Utc>) -> Liquidation {
    let mut result = Liquidation::default();
    for symbol in account.symbols() {
        let Some(price) = prices.price(&symbol) else {
            warn!(symbol = %symbol, "No price for liquidation, will retry");
            result.failed.push(symbol);
            continue;
        };
        for side in [Side::Long, Side::Short] {
            let has_side = account
                .positions
                .get(&symbol)
                .is_some_and(|held| held.iter().any(|p| p.side == side));
            if !has_side {
                continue;
            }
            match account.close_positions(&symbol, side, price, KILL_SWITCH_REASON, now) {
                Ok(summary) => result.closed.push(summary),
                Err(e) => {
                    warn!(symbol = %symbol, side = %side, error = %e, "Liquidation close failed");
                    result.failed.push(symbol.clone());
                }
            }
        }
    }
    result
}

/// Enforces exits and the daily kill switch for every account
pub struct RiskController {
    ledger: Arc<Ledger>,
    quotes: Arc<QuoteCache>,
    source: Option<Arc<dyn QuoteSource>>,
    config: RiskControllerConfig,
}

impl RiskController {
    pub fn new(ledger: Arc<Ledger>, quotes: Arc<QuoteCache>, config: RiskControllerConfig) -> Self {
        Self {
            ledger,
            quotes,
            source: None,
            config,
        }
    }

    /// Refresh quotes from `source` before every tick
    pub fn with_source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &RiskControllerConfig {
        &self.config
    }

    /// Fetch prices for every held symbol plus the watch list
    pub async fn refresh_quotes(&self) -> usize {
        let Some(source) = &self.source else {
            return 0;
        };
        let mut symbols: BTreeSet<String> = self.config.watch_symbols.iter().cloned().collect();
        for id in self.ledger.account_ids() {
            if let Ok(book) = self.ledger.book(id) {
                symbols.extend(book.lock().await.account.symbols());
            }
        }
        let symbols: Vec<String> = symbols.into_iter().collect();

        let started = Instant::now();
        let updated = self
            .quotes
            .refresh(source.as_ref(), &symbols, self.config.quote_timeout)
            .await;
        telemetry::record_latency(LatencyMetric::QuoteRefresh, started.elapsed());
        updated
    }

    /// Kill switch status for an account at current quotes
    pub async fn status(&self, account_id: &str, now: DateTime<Utc>) -> Result<KillSwitchStatus, LedgerError> {
        let book = self.ledger.book(account_id)?.lock().await;
        let equity = book.account.equity(self.quotes.as_ref());
        Ok(book.risk.status(equity, now, self.config.kill_switch_debounce))
    }

    /// Evaluate every account once at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let started = Instant::now();
        let quotes_stale = self.quotes.is_stale(now, self.config.max_price_age);
        if quotes_stale {
            warn!(
                last_success = ?self.quotes.last_success(),
                "Quotes stale, kill switch evaluation suspended"
            );
        }

        let mut report = TickReport {
            quotes_stale,
            ..Default::default()
        };
        for id in self.ledger.account_ids() {
            report.accounts += 1;
            match self.evaluate_account(id, now, quotes_stale).await {
                Ok(outcome) => {
                    report.stop_losses += outcome.stop_losses;
                    report.take_profits += outcome.take_profits;
                    report.liquidations += outcome.liquidations;
                    report.kill_switches_tripped += usize::from(outcome.tripped);
                }
                Err(e) => {
                    error!(account = %id, error = %e, "Risk evaluation failed, changes discarded");
                    report.failures += 1;
                }
            }
        }

        telemetry::record_latency(LatencyMetric::RiskTick, started.elapsed());
        report
    }

    async fn evaluate_account(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        quotes_stale: bool,
    ) -> Result<AccountOutcome, LedgerError> {
        let threshold = self.ledger.settings(account_id)?.kill_switch_pct;
        let mut book = self.ledger.book(account_id)?.lock().await;
        let mut account = book.account.clone();
        let mut risk = book.risk.clone();
        let mut outcome = AccountOutcome::default();
        let mut changed = false;

        let today = now.with_timezone(&self.config.timezone).date_naive();
        let was_active = risk.kill_switch_active;
        if risk.roll_day(today) {
            if was_active {
                info!(account = account_id, day = %today, "New day, kill switch released");
            } else {
                debug!(account = account_id, day = %today, "New trading day");
            }
        }

        for exit in scan_exits(&account, self.quotes.as_ref()) {
            let reason = exit.trigger.reason();
            match account.close_position(
                &exit.symbol,
                exit.position_id,
                exit.trigger.threshold,
                &reason,
                now,
            ) {
                Ok(summary) => {
                    changed = true;
                    let counter = match exit.trigger.kind {
                        ExitKind::StopLoss => {
                            outcome.stop_losses += 1;
                            CounterMetric::StopLossExit
                        }
                        ExitKind::TakeProfit => {
                            outcome.take_profits += 1;
                            CounterMetric::TakeProfitExit
                        }
                    };
                    telemetry::increment(counter, account_id);
                    info!(
                        account = account_id,
                        symbol = %exit.symbol,
                        side = %summary.side,
                        exit = %exit.trigger.threshold,
                        profit = %summary.profit,
                        reason = %reason,
                        "Risk exit"
                    );
                }
                Err(e) => {
                    warn!(account = account_id, symbol = %exit.symbol, error = %e, "Risk exit failed");
                }
            }
        }

        if !quotes_stale {
            let equity = account.equity(self.quotes.as_ref());
            match risk.observe(equity, now, threshold, self.config.kill_switch_debounce) {
                KillSwitchDecision::Hold => {}
                KillSwitchDecision::Baseline(start) => {
                    info!(account = account_id, starting_equity = %start, "Daily starting equity captured");
                }
                KillSwitchDecision::BreachStarted { drawdown_pct } => {
                    warn!(
                        account = account_id,
                        drawdown_pct = %drawdown_pct.round_dp(2),
                        threshold = %threshold,
                        "Drawdown breach, kill switch armed"
                    );
                }
                KillSwitchDecision::Breaching { drawdown_pct, elapsed } => {
                    debug!(
                        account = account_id,
                        drawdown_pct = %drawdown_pct.round_dp(2),
                        elapsed_secs = elapsed.num_seconds(),
                        "Drawdown breach persists"
                    );
                }
                KillSwitchDecision::Recovered { drawdown_pct } => {
                    info!(
                        account = account_id,
                        drawdown_pct = %drawdown_pct.round_dp(2),
                        "Drawdown recovered, kill switch disarmed"
                    );
                }
                KillSwitchDecision::Fire { drawdown_pct } => {
                    let liquidation = liquidate_all(&mut account, self.quotes.as_ref(), now);
                    changed |= !liquidation.closed.is_empty();
                    outcome.liquidations = liquidation.closed.len();
                    if liquidation.failed.is_empty() {
                        risk.mark_tripped();
                        outcome.tripped = true;
                        telemetry::increment(CounterMetric::KillSwitchTrip, account_id);
                        error!(
                            account = account_id,
                            drawdown_pct = ?drawdown_pct.map(|d| d.round_dp(2)),
                            closed = liquidation.closed.len(),
                            balance = %account.balance,
                            "Kill switch tripped, account liquidated"
                        );
                    } else {
                        warn!(
                            account = account_id,
                            failed = ?liquidation.failed,
                            "Kill switch liquidation incomplete, retrying next tick"
                        );
                    }
                }
            }

            telemetry::set_gauge(GaugeMetric::Equity, account_id, account.equity(self.quotes.as_ref()));
            if let Some(drawdown) = risk.drawdown_pct(equity) {
                telemetry::set_gauge(GaugeMetric::DrawdownPct, account_id, drawdown);
            }
        }

        if changed {
            if let Err(e) = self.ledger.store().save(account_id, &account).await {
                telemetry::increment(CounterMetric::PersistenceFailure, account_id);
                return Err(e.into());
            }
        }

        telemetry::set_gauge(
            GaugeMetric::KillSwitchActive,
            account_id,
            if risk.kill_switch_active { Decimal::ONE } else { Decimal::ZERO },
        );
        book.account = account;
        book.risk = risk;
        if changed {
            record_account(account_id, &book.account);
        }
        Ok(outcome)
    }

    /// Run ticks on the configured interval until `shutdown` flips to true.
    /// A panicking tick is logged and the loop carries on.
    pub fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_ms = self.config.check_interval.as_millis() as u64,
                accounts = self.ledger.account_ids().len(),
                "Risk controller started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let controller = Arc::clone(&self);
                        let pass = tokio::spawn(async move {
                            controller.refresh_quotes().await;
                            controller.tick(Utc::now()).await
                        });
                        match pass.await {
                            Ok(report) => debug!(?report, "Risk tick complete"),
                            Err(e) => error!(error = %e, "Risk tick aborted"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Risk controller stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
