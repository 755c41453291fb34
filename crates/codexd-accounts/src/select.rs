//! Sticky-cursor account selection.
//!
//! `select` never rotates away from a healthy active account; the
//! dispatcher calls `advance` only after marking a failure on the
//! current one.

use std::sync::Arc;

use crate::clock;
use crate::lifecycle;
use crate::store::{Store, StoreError};
use crate::Account;

#[derive(Clone)]
pub struct Selector {
    store: Arc<Store>,
}

impl Selector {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Pick the account the cursor points at if it is usable, otherwise
    /// the next usable one (moving the cursor). `None` when the pool
    /// has no usable account.
    pub async fn select(&self) -> Result<Option<Account>, StoreError> {
        let now = clock::now_ts();
        let (mut accounts, cursor) = self.store.snapshot().await;
        if accounts.is_empty() {
            return Ok(None);
        }
        let cursor = cursor % accounts.len();

        if lifecycle::usable(&accounts[cursor], now) {
            accounts[cursor].last_used = Some(now);
            let picked = accounts[cursor].clone();
            self.store.persist(&accounts, cursor).await?;
            return Ok(Some(picked));
        }
        self.pick_from(accounts, cursor, now).await
    }

    /// Move past the current cursor no matter what and pick the next
    /// usable account.
    pub async fn advance(&self) -> Result<Option<Account>, StoreError> {
        let now = clock::now_ts();
        let (accounts, cursor) = self.store.snapshot().await;
        if accounts.is_empty() {
            return Ok(None);
        }
        let cursor = cursor % accounts.len();
        self.pick_from(accounts, cursor, now).await
    }

    /// Directly point the cursor at `index` (the "activate" management
    /// operation).
    pub async fn set(&self, index: usize) -> Result<(), StoreError> {
        self.store.write_cursor(index).await
    }

    async fn pick_from(
        &self,
        mut accounts: Vec<Account>,
        cursor: usize,
        now: i64,
    ) -> Result<Option<Account>, StoreError> {
        let len = accounts.len();
        for step in 1..=len {
            let idx = (cursor + step) % len;
            if lifecycle::usable(&accounts[idx], now) {
                accounts[idx].last_used = Some(now);
                let picked = accounts[idx].clone();
                self.store.persist(&accounts, idx).await?;
                return Ok(Some(picked));
            }
        }
        Ok(None)
    }
}
