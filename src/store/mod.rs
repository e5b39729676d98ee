//! Ledger persistence
//!
//! Durable per-account snapshots keyed by account id

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::ledger::Account;
use async_trait::async_trait;
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error for account {account}: {source}")]
    Io {
        account: String,
        #[source]
        source: std::io::Error,
    },
    /// Snapshot could not be (de)serialized
    #[error("Corrupt snapshot for account {account}: {source}")]
    Serde {
        account: String,
        #[source]
        source: serde_json::Error,
    },
    /// Backend refused the write
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for account snapshot stores.
///
/// `save` must replace the snapshot atomically with respect to concurrent
/// `load`/`save` calls for the same id.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the snapshot for an account, `None` if it was never saved
    async fn load(&self, account_id: &str) -> Result<Option<Account>, StoreError>;
    /// Replace the snapshot for an account
    async fn save(&self, account_id: &str, account: &Account) -> Result<(), StoreError>;
}
