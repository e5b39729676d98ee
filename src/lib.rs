//! margin-ledger: leveraged paper-trading ledger
//!
//! This library provides the core components for:
//! - Multi-account cash ledger with leveraged long and short positions
//! - Stop-loss and take-profit exits at fixed thresholds
//! - Daily drawdown kill switch with debounce and token-guarded reset
//! - Quote cache fed from the CoinEx ticker API
//! - Signal gateway with buy-hour windows
//! - Atomic JSON snapshot persistence
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod quotes;
pub mod risk;
pub mod store;
pub mod telemetry;
