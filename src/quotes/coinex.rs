//! CoinEx REST quote source
//!
//! Pulls the last-trade price from the public ticker endpoint.

use super::QuoteSource;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// CoinEx API base URL
pub const COINEX_API_URL: &str = "https://api.coinex.com/v1";

/// Configuration for the CoinEx client
#[derive(Debug, Clone)]
pub struct CoinexConfig {
    /// Base URL for the REST API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for CoinexConfig {
    fn default() -> Self {
        Self {
            base_url: COINEX_API_URL.to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<TickerData>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    ticker: Ticker,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    last: String,
}

/// Client for CoinEx market tickers
pub struct CoinexClient {
    config: CoinexConfig,
    client: Client,
}

impl CoinexClient {
    /// Create a client with custom configuration
    pub fn with_config(config: CoinexConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    fn ticker_url(&self) -> String {
        format!("{}/market/ticker", self.config.base_url.trim_end_matches('/'))
    }
}

/// Extract the last price from a ticker payload
fn parse_ticker(symbol: &str, body: TickerResponse) -> anyhow::Result<Decimal> {
    if body.code != 0 {
        anyhow::bail!(
            "CoinEx error for {}: {} ({})",
            symbol,
            body.message.unwrap_or_default(),
            body.code
        );
    }
    let data = body
        .data
        .with_context(|| format!("CoinEx returned no ticker for {symbol}"))?;
    let price = Decimal::from_str(&data.ticker.last)
        .with_context(|| format!("Invalid last price for {symbol}: {}", data.ticker.last))?;
    if price <= Decimal::ZERO {
        anyhow::bail!("Non-positive last price for {symbol}: {price}");
    }
    Ok(price)
}

#[async_trait]
impl QuoteSource for CoinexClient {
    async fn fetch_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        let url = self.ticker_url();
        tracing::debug!(url = %url, symbol, "Fetching CoinEx ticker");

        let response = self
            .client
            .get(&url)
            .query(&[("market", symbol)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("CoinEx API error: {} - {}", status, body);
        }

        let body: TickerResponse = response.json().await?;
        parse_ticker(symbol, body)
    }
}
