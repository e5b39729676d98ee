//! Signal gateway fed with raw JSON lines

use crate::common::{harness, t0, ACCOUNT};
use margin_ledger::config::TradingSettings;
use margin_ledger::gateway::{GatewayCommand, GatewayOutcome, SignalGateway};
use margin_ledger::ledger::LedgerError;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn command(line: &str) -> GatewayCommand {
    serde_json::from_str(line).unwrap()
}

#[tokio::test]
async fn test_json_signals_drive_ledger() {
    let h = harness(TradingSettings::default(), 300).await;
    let gateway = SignalGateway::new(
        Arc::clone(&h.ledger),
        Arc::clone(&h.quotes),
        chrono_tz::America::Edmonton,
    )
    .unwrap();

    let outcome = gateway
        .dispatch(
            command(r#"{"type":"signal","bot":"Coinbot 1.0","action":"short","symbol":"ethusdt","price":2500,"reason":"RSI > 70"}"#),
            t0(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, GatewayOutcome::Opened { .. }));

    // No price on the signal: falls back to the cached quote
    h.quotes.set_price("ETHUSDT", dec!(2450), t0());
    let outcome = gateway
        .dispatch(
            command(r#"{"type":"signal","bot":"coinbot1.0","action":"cover","symbol":"ETHUSDT"}"#),
            t0(),
        )
        .await
        .unwrap();
    match outcome {
        GatewayOutcome::Closed { account, summary } => {
            assert_eq!(account, ACCOUNT);
            assert_eq!(summary.exit_price, dec!(2450));
            assert_eq!(summary.profit, dec!(5));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let account = h.ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.trade_log[0].reason, "RSI > 70");
    assert_eq!(account.balance, dec!(1005));

    let err = gateway
        .dispatch(
            command(r#"{"type":"signal","bot":"Coinbot 1.0","action":"cover","symbol":"ETHUSDT"}"#),
            t0(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoMatchingPositions { .. }));
}

#[test]
fn test_outcome_serializes_with_status() {
    let outcome = GatewayOutcome::Reset {
        account: ACCOUNT.into(),
        next_token: uuid::Uuid::nil(),
    };
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], "reset");
    assert_eq!(value["account"], ACCOUNT);
}
