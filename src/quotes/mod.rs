//! Quote module
//!
//! Last-trade prices per symbol, refreshed from an external quote source

mod cache;
mod coinex;

pub use cache::QuoteCache;
pub use coinex::{CoinexClient, CoinexConfig, COINEX_API_URL};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Synchronous price lookup used by the ledger
pub trait PriceLookup: Send + Sync {
    /// Latest known price for `symbol`, if any
    fn price(&self, symbol: &str) -> Option<Decimal>;
}

/// Trait for external quote sources
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the last-trade price for a symbol
    async fn fetch_price(&self, symbol: &str) -> anyhow::Result<Decimal>;
}
