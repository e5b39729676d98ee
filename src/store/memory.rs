//! In-memory store

use super::{LedgerStore, StoreError};
use crate::ledger::Account;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot store backed by a map; nothing survives the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail until turned off again
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of saved snapshots
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Whether nothing has been saved yet
    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(account_id).cloned())
    }

    async fn save(&self, account_id: &str, account: &Account) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "save rejected for account {account_id}"
            )));
        }
        self.accounts
            .write()
            .await
            .insert(account_id.to_string(), account.clone());
        Ok(())
    }
}
