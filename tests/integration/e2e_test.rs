//! End-to-end integration tests

use crate::common::t0;
use margin_ledger::config::Config;
use margin_ledger::gateway::{SignalGateway, TradeSignal};
use margin_ledger::ledger::{symbol_pnl, Ledger};
use margin_ledger::quotes::QuoteCache;
use margin_ledger::store::JsonFileStore;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[test]
fn test_config_example_loads() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.accounts.len(), 3);
    assert_eq!(config.ledger.starting_balance, dec!(1000));

    let second = config.accounts[1].settings(&config.defaults);
    assert_eq!(second.leverage, 10);
    assert_eq!(second.stop_loss_pct, dec!(1.5));
    assert_eq!(second.take_profit_pct, dec!(3));
}

fn config_for(dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
        [ledger]
        starting_balance = 1000

        [[accounts]]
        id = "1.0"

        [[accounts]]
        id = "2.0"
        leverage = 10

        [store]
        data_dir = "{}"
        "#,
        dir.display()
    );
    Config::from_toml(&toml).unwrap()
}

fn signal(bot: &str, action: &str, price: rust_decimal::Decimal) -> TradeSignal {
    TradeSignal {
        bot: bot.into(),
        action: action.into(),
        symbol: "BTCUSDT".into(),
        price: Some(price),
        reason: None,
    }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    {
        let store = JsonFileStore::open(&config.store.data_dir).await.unwrap();
        let ledger = Arc::new(Ledger::from_config(Arc::new(store), &config).await.unwrap());
        let gateway = SignalGateway::new(
            Arc::clone(&ledger),
            Arc::new(QuoteCache::new()),
            config.timezone().unwrap(),
        )
        .unwrap();

        gateway.handle(&signal("Coinbot 1.0", "buy", dec!(100)), t0()).await.unwrap();
        gateway.handle(&signal("Coinbot 1.0", "sell", dec!(110)), t0()).await.unwrap();
        gateway.handle(&signal("Coinbot 2.0", "buy", dec!(100)), t0()).await.unwrap();
    }

    let store = JsonFileStore::open(&config.store.data_dir).await.unwrap();
    let ledger = Ledger::from_config(Arc::new(store), &config).await.unwrap();

    let first = ledger.snapshot("1.0").await.unwrap();
    assert_eq!(first.balance, dec!(1025));
    assert_eq!(first.total_open(), 0);
    assert_eq!(symbol_pnl(&first.trade_log)["BTCUSDT"], dec!(25));

    let second = ledger.snapshot("2.0").await.unwrap();
    assert_eq!(second.balance, dec!(950));
    let position = &second.positions["BTCUSDT"][0];
    assert_eq!(position.leverage, 10);
    assert_eq!(position.volume, dec!(5));
}
