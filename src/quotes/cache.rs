//! In-memory quote cache with staleness tracking

use super::{PriceLookup, QuoteSource};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// A cached price and when it was fetched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
}

/// Most recent price per symbol
#[derive(Debug, Default)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<String, Quote>>,
    last_success: RwLock<Option<DateTime<Utc>>>,
}

impl QuoteCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price observed at `at`. Non-positive prices are ignored.
    pub fn set_price(&self, symbol: &str, price: Decimal, at: DateTime<Utc>) -> bool {
        if price <= Decimal::ZERO {
            tracing::warn!(symbol, %price, "Ignoring non-positive quote");
            return false;
        }
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                symbol.to_string(),
                Quote {
                    price,
                    fetched_at: at,
                },
            );
        let mut last = self
            .last_success
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if last.map_or(true, |t| t < at) {
            *last = Some(at);
        }
        true
    }

    /// Cached quote for a symbol
    pub fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }

    /// Time of the most recent successful fetch across all symbols
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        *self
            .last_success
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the latest successful fetch is older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_success() {
            Some(at) => now - at > max_age,
            None => true,
        }
    }

    /// Fetch all `symbols` concurrently, each bounded by `timeout`.
    ///
    /// Failed or timed-out symbols keep their previous price. Returns the
    /// number of symbols updated.
    pub async fn refresh(
        &self,
        source: &dyn QuoteSource,
        symbols: &[String],
        timeout: std::time::Duration,
    ) -> usize {
        let fetches = symbols.iter().map(|symbol| async move {
            let result = tokio::time::timeout(timeout, source.fetch_price(symbol)).await;
            (symbol, result)
        });

        let mut updated = 0;
        for (symbol, result) in join_all(fetches).await {
            match result {
                Ok(Ok(price)) => {
                    if self.set_price(symbol, price, Utc::now()) {
                        updated += 1;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Quote fetch failed");
                }
                Err(_) => {
                    tracing::warn!(
                        symbol = %symbol,
                        timeout_ms = timeout.as_millis() as u64,
                        "Quote fetch timed out"
                    );
                }
            }
        }

        if updated == 0 && !symbols.is_empty() {
            tracing::warn!("No quotes refreshed, keeping previous prices");
        } else {
            tracing::debug!(updated, requested = symbols.len(), "Quotes refreshed");
        }
        updated
    }
}

impl PriceLookup for QuoteCache {
    fn price(&self, symbol: &str) -> Option<Decimal> {
        self.quote(symbol).map(|q| q.price)
    }
}
