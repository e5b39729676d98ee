//! Ledger service behavior under concurrency

use crate::common::{t0, ACCOUNT};
use futures_util::future::join_all;
use margin_ledger::config::TradingSettings;
use margin_ledger::ledger::{Ledger, LedgerError, Side};
use margin_ledger::quotes::QuoteCache;
use margin_ledger::store::{LedgerStore, MemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

async fn ledger(accounts: &[&str]) -> (MemoryStore, Arc<Ledger>) {
    let store = MemoryStore::new();
    let ledger = Ledger::load(
        Arc::new(store.clone()),
        accounts
            .iter()
            .map(|id| (id.to_string(), TradingSettings::default()))
            .collect(),
        dec!(1000),
    )
    .await
    .unwrap();
    (store, Arc::new(ledger))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_respect_cap() {
    let (store, ledger) = ledger(&[ACCOUNT]).await;

    let tasks = (0..20).map(|_| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            ledger
                .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "burst", t0())
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let opened = results.iter().filter(|r| r.is_ok()).count();
    let capped = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::PositionLimitReached { .. })))
        .count();
    assert_eq!(opened, 5);
    assert_eq!(capped, 15);

    let account = ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.balance, dec!(773.7809375));
    assert_eq!(account.trade_log.len(), 5);
    assert_eq!(store.load(ACCOUNT).await.unwrap().unwrap(), account);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_open_close_conserves_cash() {
    let (_, ledger) = ledger(&[ACCOUNT, "2.0"]).await;

    let tasks = (0..40).map(|i| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            let account = if i % 2 == 0 { ACCOUNT } else { "2.0" };
            if i % 3 == 0 {
                let _ = ledger
                    .close(account, "ETHUSDT", Side::Short, dec!(2400), "flip", t0())
                    .await;
            } else {
                let _ = ledger
                    .open(account, "ETHUSDT", Side::Short, dec!(2500), "flip", t0())
                    .await;
            }
        })
    });
    for task in join_all(tasks).await {
        task.unwrap();
    }

    let quotes = QuoteCache::new();
    for id in [ACCOUNT, "2.0"] {
        let account = ledger.snapshot(id).await.unwrap();
        assert!(account.balance >= Decimal::ZERO);
        assert!(account.open_count("ETHUSDT") <= 5);

        let realized: Decimal = account.trade_log.iter().filter_map(|t| t.profit).sum();
        // Unquoted positions contribute no unrealized P&L
        assert_eq!(
            ledger.equity(id, &quotes).await.unwrap(),
            dec!(1000) + realized
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_closes_settle_once() {
    let (store, ledger) = ledger(&[ACCOUNT]).await;
    for _ in 0..3 {
        ledger
            .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
            .await
            .unwrap();
    }

    let tasks = (0..16).map(|_| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            ledger
                .close(ACCOUNT, "BTCUSDT", Side::Long, dec!(90), "burst", t0())
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let closed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let empty = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::NoMatchingPositions { .. })))
        .count();
    assert_eq!(closed.len(), 1);
    assert_eq!(empty, 15);

    // Margins 50 + 47.5 + 45.125 hold 7.13125 units, losing 10 each
    assert_eq!(closed[0].positions, 3);
    assert_eq!(closed[0].total_volume, dec!(7.13125));
    assert_eq!(closed[0].profit, dec!(-71.3125));

    let account = ledger.snapshot(ACCOUNT).await.unwrap();
    assert_eq!(account.balance, dec!(928.6875));
    assert_eq!(account.total_open(), 0);
    assert_eq!(account.trade_log.len(), 4);
    assert_eq!(store.load(ACCOUNT).await.unwrap().unwrap(), account);
}

#[tokio::test]
async fn test_round_trip_example() {
    let (_, ledger) = ledger(&[ACCOUNT]).await;

    let position = ledger
        .open(ACCOUNT, "BTCUSDT", Side::Long, dec!(100), "entry", t0())
        .await
        .unwrap();
    assert_eq!(position.volume, dec!(2.5));
    assert_eq!(position.margin_used, dec!(50));
    assert_eq!(ledger.snapshot(ACCOUNT).await.unwrap().balance, dec!(950));

    let summary = ledger
        .close(ACCOUNT, "BTCUSDT", Side::Long, dec!(120), "exit", t0())
        .await
        .unwrap();
    assert_eq!(summary.profit, dec!(50));
    assert_eq!(summary.pl_pct, dec!(20));
    assert_eq!(summary.balance_after, dec!(1050));

    assert!(matches!(
        ledger
            .close(ACCOUNT, "BTCUSDT", Side::Long, dec!(120), "again", t0())
            .await,
        Err(LedgerError::NoMatchingPositions { .. })
    ));
}
