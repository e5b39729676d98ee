//! Prometheus metrics

use ::metrics::{counter, gauge, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One full pass of the risk controller
    RiskTick,
    /// Quote refresh round
    QuoteRefresh,
}

/// Per-account gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Balance plus margin plus unrealized P&L
    Equity,
    /// Cash not committed to margin
    Balance,
    /// Open position count
    OpenPositions,
    /// Drawdown from the day's starting equity, in percent
    DrawdownPct,
    /// 1 while the kill switch is active
    KillSwitchActive,
}

/// Per-account event counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    StopLossExit,
    TakeProfitExit,
    KillSwitchTrip,
    PersistenceFailure,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::RiskTick => "ledger_risk_tick_latency_ms",
        LatencyMetric::QuoteRefresh => "ledger_quote_refresh_latency_ms",
    };

    histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a per-account gauge value
pub fn set_gauge(metric: GaugeMetric, account: &str, value: Decimal) {
    let metric_name = match metric {
        GaugeMetric::Equity => "ledger_equity_usd",
        GaugeMetric::Balance => "ledger_balance_usd",
        GaugeMetric::OpenPositions => "ledger_open_positions",
        GaugeMetric::DrawdownPct => "ledger_drawdown_pct",
        GaugeMetric::KillSwitchActive => "ledger_kill_switch_active",
    };

    gauge!(metric_name, "account" => account.to_string()).set(value.to_f64().unwrap_or_default());
}

/// Bump a per-account counter
pub fn increment(metric: CounterMetric, account: &str) {
    let metric_name = match metric {
        CounterMetric::StopLossExit => "ledger_stop_loss_exits_total",
        CounterMetric::TakeProfitExit => "ledger_take_profit_exits_total",
        CounterMetric::KillSwitchTrip => "ledger_kill_switch_trips_total",
        CounterMetric::PersistenceFailure => "ledger_persistence_failures_total",
    };

    counter!(metric_name, "account" => account.to_string()).increment(1);
}
