//! Flat-file persistence for the account sequence and the active-index
//! cursor.
//!
//! Each file has its own async mutex; every read and write goes through
//! the owning lock, and operations touching both files always take the
//! accounts lock first. Writes land on a sibling temp file and are
//! renamed over the target, so a crash can never leave a torn file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;

use crate::account::Account;

const ACCOUNTS_FILE: &str = "accounts.json";
const CURSOR_FILE: &str = "active_index";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encode: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Store {
    accounts_path: PathBuf,
    cursor_path: PathBuf,
    accounts_lock: Mutex<()>,
    cursor_lock: Mutex<()>,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            accounts_path: dir.join(ACCOUNTS_FILE),
            cursor_path: dir.join(CURSOR_FILE),
            accounts_lock: Mutex::new(()),
            cursor_lock: Mutex::new(()),
        }
    }

    /// Missing or unreadable file degrades to an empty pool.
    pub async fn read_accounts(&self) -> Vec<Account> {
        let _guard = self.accounts_lock.lock().await;
        read_accounts_file(&self.accounts_path).await
    }

    pub async fn write_accounts(&self, accounts: &[Account]) -> Result<(), StoreError> {
        let _guard = self.accounts_lock.lock().await;
        write_accounts_file(&self.accounts_path, accounts).await
    }

    /// Missing or garbled cursor reads as 0.
    pub async fn read_cursor(&self) -> usize {
        let _guard = self.cursor_lock.lock().await;
        read_cursor_file(&self.cursor_path).await
    }

    pub async fn write_cursor(&self, index: usize) -> Result<(), StoreError> {
        let _guard = self.cursor_lock.lock().await;
        write_atomic(&self.cursor_path, index.to_string().as_bytes()).await?;
        Ok(())
    }

    /// Read-modify-write of one account; a missing id is a no-op.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Option<Account>, StoreError>
    where
        F: FnOnce(&mut Account),
    {
        let _guard = self.accounts_lock.lock().await;
        let mut accounts = read_accounts_file(&self.accounts_path).await;
        let Some(account) = accounts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        mutate(account);
        let updated = account.clone();
        write_accounts_file(&self.accounts_path, &accounts).await?;
        Ok(Some(updated))
    }

    pub async fn insert(&self, account: Account) -> Result<(), StoreError> {
        let _guard = self.accounts_lock.lock().await;
        let mut accounts = read_accounts_file(&self.accounts_path).await;
        // Ids are set-unique; a re-import replaces in place.
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
        write_accounts_file(&self.accounts_path, &accounts).await
    }

    pub async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.accounts_lock.lock().await;
        let mut accounts = read_accounts_file(&self.accounts_path).await;
        let before = accounts.len();
        accounts.retain(|a| a.id != id);
        if accounts.len() == before {
            return Ok(false);
        }
        write_accounts_file(&self.accounts_path, &accounts).await?;
        Ok(true)
    }

    pub async fn get(&self, id: &str) -> Option<Account> {
        self.read_accounts()
            .await
            .into_iter()
            .find(|a| a.id == id)
    }

    /// Snapshot of both files, taken under the fixed accounts→cursor
    /// lock order.
    pub async fn snapshot(&self) -> (Vec<Account>, usize) {
        let _accounts = self.accounts_lock.lock().await;
        let _cursor = self.cursor_lock.lock().await;
        (
            read_accounts_file(&self.accounts_path).await,
            read_cursor_file(&self.cursor_path).await,
        )
    }

    /// Persist the account sequence and cursor together (same lock
    /// order as `snapshot`).
    pub async fn persist(&self, accounts: &[Account], cursor: usize) -> Result<(), StoreError> {
        let _accounts = self.accounts_lock.lock().await;
        let _cursor = self.cursor_lock.lock().await;
        write_accounts_file(&self.accounts_path, accounts).await?;
        write_atomic(&self.cursor_path, cursor.to_string().as_bytes()).await?;
        Ok(())
    }
}

async fn read_accounts_file(path: &Path) -> Vec<Account> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), %err, "accounts file unreadable, treating as empty");
            return Vec::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(accounts) => accounts,
        Err(err) => {
            warn!(path = %path.display(), %err, "accounts file garbled, treating as empty");
            Vec::new()
        }
    }
}

async fn write_accounts_file(path: &Path, accounts: &[Account]) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec_pretty(accounts)?;
    write_atomic(path, &encoded).await?;
    Ok(())
}

async fn read_cursor_file(path: &Path) -> usize {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}
