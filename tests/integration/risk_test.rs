//! Risk controller scenarios

use crate::common::{harness, kill_switch_settings, secs, t0, ACCOUNT};
use chrono::{Duration, TimeZone, Utc};
use margin_ledger::config::TradingSettings;
use margin_ledger::ledger::{Action, LedgerError, Side};
use margin_ledger::risk::{KillSwitchPhase, KILL_SWITCH_REASON};
use margin_ledger::store::LedgerStore;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn test_stop_loss_closes_at_threshold() {
    let h = harness(TradingSettings::default(), 300).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();

    h.quotes.set_price("BTCUSDT", dec!(97.6), t0());
    assert_eq!(h.controller.tick(t0()).await.stop_losses, 0);

    h.quotes.set_price("BTCUSDT", dec!(97.4), secs(2));
    let report = h.controller.tick(secs(2)).await;
    assert_eq!(report.stop_losses, 1);

    let account = h.ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.total_open(), 0);
    let exit = account.trade_log.last().unwrap();
    assert_eq!(exit.action, Action::Sell);
    assert_eq!(exit.price, dec!(97.5));
    assert_eq!(exit.profit, Some(dec!(-6.25)));
    assert!(exit.reason.starts_with("Stop loss"));
    assert_eq!(account.balance, dec!(993.75));

    // Persisted with the same tick
    let saved = h.store.load(ACCOUNT).await.unwrap().unwrap();
    assert_eq!(saved, account);
}

#[tokio::test]
async fn test_kill_switch_debounce_and_latch() {
    let h = harness(kill_switch_settings(), 300).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();

    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;
    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert_eq!(state.starting_equity, Some(dec!(1000)));

    // 20x on 50 margin holds 10 units; 94 is a 6% drawdown
    h.quotes.set_price("BTCUSDT", dec!(94), secs(10));
    h.controller.tick(secs(10)).await;
    assert!(matches!(
        h.ledger.risk_state(ACCOUNT).await.unwrap().phase(),
        KillSwitchPhase::Breaching { .. }
    ));

    h.quotes.set_price("BTCUSDT", dec!(94), secs(309));
    let report = h.controller.tick(secs(309)).await;
    assert_eq!(report.liquidations, 0);
    assert_eq!(h.ledger.snapshot(ACCOUNT).await.unwrap().total_open(), 1);

    h.quotes.set_price("BTCUSDT", dec!(94), secs(310));
    let report = h.controller.tick(secs(310)).await;
    assert_eq!(report.liquidations, 1);
    assert_eq!(report.kill_switches_tripped, 1);

    let account = h.ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.total_open(), 0);
    assert_eq!(account.balance, dec!(940));
    assert_eq!(account.trade_log.last().unwrap().reason, KILL_SWITCH_REASON);

    let result = h
        .ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(94), "retry", secs(311))
        .await;
    assert!(matches!(result, Err(LedgerError::TradingHalted(_))));

    // Fires once; the latched switch does nothing more
    let report = h.controller.tick(secs(320)).await;
    assert_eq!(report.kill_switches_tripped, 0);
    assert_eq!(report.liquidations, 0);
}

#[tokio::test]
async fn test_stale_quotes_suspend_kill_switch() {
    let h = harness(kill_switch_settings(), 0).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;

    h.quotes.set_price("BTCUSDT", dec!(90), secs(1));
    let report = h.controller.tick(secs(1000)).await;
    assert!(report.quotes_stale);
    assert_eq!(report.liquidations, 0);
    assert!(!h.ledger.risk_state(ACCOUNT).await.unwrap().trading_halted());

    h.quotes.set_price("BTCUSDT", dec!(90), secs(1001));
    let report = h.controller.tick(secs(1001)).await;
    assert!(!report.quotes_stale);
    assert_eq!(report.kill_switches_tripped, 1);
}

#[tokio::test]
async fn test_exits_run_while_quotes_stale() {
    let h = harness(TradingSettings::default(), 300).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Short, dec!(100), "entry", t0())
        .await
        .unwrap();

    h.quotes.set_price("BTCUSDT", dec!(96), t0());
    let report = h.controller.tick(secs(3600)).await;
    assert!(report.quotes_stale);
    assert_eq!(report.take_profits, 1);
    let exit = h.ledger.snapshot(ACCOUNT).await.unwrap();
    let last = exit.trade_log.last().unwrap();
    assert_eq!(last.action, Action::Cover);
    assert_eq!(last.price, dec!(97));
}

#[tokio::test]
async fn test_rollover_releases_kill_switch() {
    let h = harness(kill_switch_settings(), 0).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;
    h.quotes.set_price("BTCUSDT", dec!(90), secs(2));
    h.controller.tick(secs(2)).await;

    let tripped = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert!(tripped.kill_switch_active);

    // Still the same local day late in the evening
    let evening = Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap();
    h.quotes.set_price("BTCUSDT", dec!(90), evening);
    h.controller.tick(evening).await;
    assert!(h.ledger.risk_state(ACCOUNT).await.unwrap().kill_switch_active);

    let next_day = Utc.with_ymd_and_hms(2024, 3, 2, 7, 30, 0).unwrap();
    h.quotes.set_price("BTCUSDT", dec!(90), next_day);
    h.controller.tick(next_day).await;

    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert!(!state.kill_switch_active);
    assert_ne!(state.reset_token, tripped.reset_token);
    assert_eq!(state.starting_equity, Some(dec!(900)));
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(90), "new day", next_day)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pending_liquidation_survives_rollover() {
    let h = harness(kill_switch_settings(), 0).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    h.ledger
        .open(ACCOUNT, "ETHUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();

    // No ETHUSDT quote, so liquidation can only close BTCUSDT
    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;
    h.quotes.set_price("BTCUSDT", dec!(90), secs(2));
    let report = h.controller.tick(secs(2)).await;
    assert_eq!(report.liquidations, 1);
    assert_eq!(report.kill_switches_tripped, 0);
    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert_eq!(state.phase(), KillSwitchPhase::Liquidating);
    let token = state.reset_token;

    assert!(matches!(
        h.ledger.manual_reset(ACCOUNT, token).await,
        Err(LedgerError::LiquidationPending)
    ));

    let next_day = Utc.with_ymd_and_hms(2024, 3, 2, 7, 30, 0).unwrap();
    h.quotes.set_price("BTCUSDT", dec!(90), next_day);
    let report = h.controller.tick(next_day).await;
    assert_eq!(report.kill_switches_tripped, 0);

    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert!(state.liquidation_pending);
    assert!(state.trading_halted());
    let result = h
        .ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(90), "new day", next_day)
        .await;
    assert!(matches!(result, Err(LedgerError::TradingHalted(_))));

    let later = next_day + Duration::seconds(2);
    h.quotes.set_price("BTCUSDT", dec!(90), later);
    h.quotes.set_price("ETHUSDT", dec!(100), later);
    let report = h.controller.tick(later).await;
    assert_eq!(report.liquidations, 1);
    assert_eq!(report.kill_switches_tripped, 1);

    let account = h.ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.total_open(), 0);
    assert_eq!(account.balance, dec!(900));

    // The token held during liquidation is still the one that releases it
    h.ledger.manual_reset(ACCOUNT, token).await.unwrap();
    assert!(!h.ledger.risk_state(ACCOUNT).await.unwrap().trading_halted());
}

#[tokio::test]
async fn test_manual_reset_requires_current_token() {
    let h = harness(kill_switch_settings(), 0).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;
    h.quotes.set_price("BTCUSDT", dec!(90), secs(2));
    h.controller.tick(secs(2)).await;

    assert!(matches!(
        h.ledger.manual_reset(ACCOUNT, Uuid::new_v4()).await,
        Err(LedgerError::InvalidResetToken)
    ));
    assert!(h.ledger.risk_state(ACCOUNT).await.unwrap().kill_switch_active);

    let token = h.ledger.reset_token(ACCOUNT).await.unwrap();
    let next = h.ledger.manual_reset(ACCOUNT, token).await.unwrap();
    assert_eq!(h.ledger.reset_token(ACCOUNT).await.unwrap(), next);

    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert!(!state.trading_halted());
    assert_eq!(state.starting_equity, None);

    // Next fresh tick captures a new baseline instead of re-firing
    h.controller.tick(secs(4)).await;
    let state = h.ledger.risk_state(ACCOUNT).await.unwrap();
    assert_eq!(state.starting_equity, Some(dec!(900)));
    assert!(!state.kill_switch_active);
}

#[tokio::test]
async fn test_failed_save_discards_tick() {
    let h = harness(TradingSettings::default(), 300).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();

    h.store.set_fail_saves(true);
    h.quotes.set_price("BTCUSDT", dec!(90), t0());
    let report = h.controller.tick(t0()).await;
    assert_eq!(report.failures, 1);
    assert_eq!(h.ledger.snapshot(ACCOUNT).await.unwrap().total_open(), 1);

    h.store.set_fail_saves(false);
    let report = h.controller.tick(t0() + Duration::seconds(2)).await;
    assert_eq!(report.failures, 0);
    assert_eq!(report.stop_losses, 1);
    assert_eq!(h.ledger.snapshot(ACCOUNT).await.unwrap().total_open(), 0);
}

#[tokio::test]
async fn test_status_reports_breach_countdown() {
    let h = harness(kill_switch_settings(), 300).await;
    h.ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    h.quotes.set_price("BTCUSDT", dec!(100), t0());
    h.controller.tick(t0()).await;

    let status = h.controller.status(ACCOUNT, t0()).await.unwrap();
    assert_eq!(status.phase, KillSwitchPhase::Normal);
    assert_eq!(status.drawdown_pct, Some(dec!(0)));

    h.quotes.set_price("BTCUSDT", dec!(93), secs(20));
    h.controller.tick(secs(20)).await;
    let status = h.controller.status(ACCOUNT, secs(80)).await.unwrap();
    assert!(matches!(status.phase, KillSwitchPhase::Breaching { .. }));
    assert_eq!(status.equity, dec!(930));
    assert_eq!(status.drawdown_pct, Some(dec!(7)));
    assert_eq!(status.seconds_remaining, Some(240));
}
