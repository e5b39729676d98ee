//! Shared fixtures

use chrono::{DateTime, Duration, TimeZone, Utc};
use margin_ledger::config::TradingSettings;
use margin_ledger::ledger::Ledger;
use margin_ledger::quotes::QuoteCache;
use margin_ledger::risk::{RiskController, RiskControllerConfig};
use margin_ledger::store::MemoryStore;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const ACCOUNT: &str = "1.0";

/// 2024-03-01 11:00 in Edmonton
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
}

pub fn secs(n: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(n)
}

/// Wide exits and high leverage so the kill switch can be reached
/// without a stop-loss closing first
pub fn kill_switch_settings() -> TradingSettings {
    TradingSettings {
        leverage: 20,
        stop_loss_pct: dec!(50),
        take_profit_pct: dec!(50),
        ..TradingSettings::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub ledger: Arc<Ledger>,
    pub quotes: Arc<QuoteCache>,
    pub controller: RiskController,
}

pub async fn harness(settings: TradingSettings, debounce_secs: i64) -> Harness {
    let store = MemoryStore::new();
    let ledger = Arc::new(
        Ledger::load(
            Arc::new(store.clone()),
            vec![(ACCOUNT.to_string(), settings)],
            dec!(1000),
        )
        .await
        .unwrap(),
    );
    let quotes = Arc::new(QuoteCache::new());
    let controller = RiskController::new(
        Arc::clone(&ledger),
        Arc::clone(&quotes),
        RiskControllerConfig {
            kill_switch_debounce: Duration::seconds(debounce_secs),
            ..RiskControllerConfig::default()
        },
    );
    Harness {
        store,
        ledger,
        quotes,
        controller,
    }
}
