//! Status command implementation

use crate::config::Config;
use crate::ledger::{position_stats, symbol_pnl, trades_by_date};
use crate::quotes::{CoinexClient, CoinexConfig, QuoteCache};
use crate::store::{JsonFileStore, LedgerStore};
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this account
    #[arg(short, long)]
    pub account: Option<String>,

    /// Skip the quote refresh; positions are shown unmarked
    #[arg(long)]
    pub offline: bool,

    /// Number of most recent days of trades to list
    #[arg(long, default_value_t = 3)]
    pub days: usize,
}

impl StatusArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let store = JsonFileStore::open(&config.store.data_dir).await?;
        let tz = config.timezone()?;
        let quotes = QuoteCache::new();
        let timeout = Duration::from_millis(config.quotes.timeout_ms);
        let client = if self.offline {
            None
        } else {
            Some(CoinexClient::with_config(CoinexConfig {
                base_url: config.quotes.base_url.clone(),
                timeout,
            })?)
        };

        for account_config in &config.accounts {
            if self.account.as_deref().is_some_and(|a| a != account_config.id) {
                continue;
            }
            println!("{} ({})", account_config.display_name(), account_config.id);

            let Some(account) = store.load(&account_config.id).await? else {
                println!("  No saved state");
                continue;
            };

            if let Some(client) = &client {
                quotes.refresh(client, &account.symbols(), timeout).await;
            }

            println!("  Balance: {:.2}", account.balance);
            println!("  Margin in use: {:.2}", account.margin_in_use());
            if client.is_some() {
                println!("  Equity: {:.2}", account.equity(&quotes));
            }

            let stats = position_stats(&account, &quotes);
            println!("  Open positions: {}", stats.len());
            for stat in stats {
                let mark = match (stat.current_price, stat.unrealized_pnl) {
                    (Some(price), Some(pnl)) => format!(" now {price} pnl {pnl:.2}"),
                    _ => String::new(),
                };
                println!(
                    "    {} {} {} @ {} x{} SL {:.4} TP {:.4}{}",
                    stat.symbol,
                    stat.side,
                    stat.volume,
                    stat.entry_price,
                    stat.leverage,
                    stat.stop_loss_price,
                    stat.take_profit_price,
                    mark
                );
            }

            let pnl = symbol_pnl(&account.trade_log);
            if !pnl.is_empty() {
                println!("  Realized P&L:");
                for (symbol, profit) in pnl {
                    println!("    {symbol}: {profit:.2}");
                }
            }

            for (day, trades) in trades_by_date(&account.trade_log, tz).into_iter().take(self.days) {
                println!("  {day}:");
                for trade in trades {
                    let profit = trade
                        .profit
                        .map(|p| format!(" profit {p:.2}"))
                        .unwrap_or_default();
                    println!(
                        "    {} {} {} {} @ {}{} ({})",
                        trade.timestamp.with_timezone(&tz).format("%H:%M:%S"),
                        trade.action,
                        trade.symbol,
                        trade.amount,
                        trade.price,
                        profit,
                        trade.reason
                    );
                }
            }
        }
        Ok(())
    }
}
