//! JSON file store
//!
//! One `account_<id>.json` per account. Writes go to a temp file that is
//! renamed over the target, so readers see either the old or the new
//! snapshot and never a partial one.

use super::{LedgerStore, StoreError};
use crate::ledger::Account;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File-backed snapshot store
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `data_dir`, creating the directory if needed
    pub async fn open(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        tracing::info!(dir = %data_dir.display(), "Opened JSON ledger store");
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the snapshots
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshot path for an account id
    pub fn path_for(&self, account_id: &str) -> PathBuf {
        let safe: String = account_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.data_dir.join(format!("account_{safe}.json"))
    }
}

fn io_error(account_id: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        account: account_id.to_string(),
        source,
    }
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn load(&self, account_id: &str) -> Result<Option<Account>, StoreError> {
        let path = self.path_for(account_id);
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(account_id, e)),
        };

        let account = serde_json::from_slice(&content).map_err(|source| StoreError::Serde {
            account: account_id.to_string(),
            source,
        })?;
        Ok(Some(account))
    }

    async fn save(&self, account_id: &str, account: &Account) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(account).map_err(|source| StoreError::Serde {
            account: account_id.to_string(),
            source,
        })?;

        let path = self.path_for(account_id);
        let tmp_path = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| io_error(account_id, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(account_id, e))?;

        tracing::debug!(account = account_id, path = %path.display(), "Account snapshot saved");
        Ok(())
    }
}
