//! Ledger module
//!
//! Accounts, leveraged positions, trade log, and the multi-account service
//! that serializes and persists every mutation.

mod book;
mod position;
mod stats;
mod types;

pub use book::{AccountBook, Ledger};
pub(crate) use book::record_account;
pub use position::{exit_thresholds, VOLUME_DP};
pub use stats::{position_stats, symbol_pnl, trades_by_date, PositionStat};
pub use types::{
    Account, Action, ClosedSummary, LedgerError, OpenRequest, Position, Side, TradeRecord,
};
