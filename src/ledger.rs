//! Wallet: a per-user balance debited once per generation run.
//!
//! Every mutation re-reads the latest persisted balance immediately before
//! writing, so a balance captured earlier in a session is never trusted.

use serde::{Deserialize, Serialize};

use crate::storage::{Storage, StorageError};

/// Cost of one full generation run, in currency units.
pub const VIDEO_COST: u64 = 10;

/// Errors from wallet operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Wallet record for '{user}' is corrupt: {source}")]
    Corrupt {
        user: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WalletRecord {
    balance: u64,
}

/// Per-user balance store over an injected [`Storage`] backend.
pub struct Wallet<S: Storage> {
    storage: S,
}

impl<S: Storage> Wallet<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Current balance for `user`; unknown users have a zero balance.
    pub fn balance(&self, user: &str) -> Result<u64, WalletError> {
        Ok(self.load(user)?.balance)
    }

    /// Credit `amount` to the user's balance and return the new balance.
    pub fn add_funds(&self, user: &str, amount: u64) -> Result<u64, WalletError> {
        let mut record = self.load(user)?;
        record.balance = record.balance.saturating_add(amount);
        self.store(user, &record)?;
        log::info!("Credited {} to {}; balance is now {}", amount, user, record.balance);
        Ok(record.balance)
    }

    /// Debit `amount` from the user's balance.
    ///
    /// Returns `false` without mutating anything when `amount` exceeds the
    /// balance read at the moment of the charge.
    pub fn charge(&self, user: &str, amount: u64) -> Result<bool, WalletError> {
        let mut record = self.load(user)?;
        if record.balance < amount {
            log::warn!(
                "Declined charge of {} for {}: balance is {}",
                amount,
                user,
                record.balance
            );
            return Ok(false);
        }
        record.balance -= amount;
        self.store(user, &record)?;
        log::info!("Charged {} to {}; balance is now {}", amount, user, record.balance);
        Ok(true)
    }

    fn key(user: &str) -> String {
        format!("wallet/{}", user)
    }

    fn load(&self, user: &str) -> Result<WalletRecord, WalletError> {
        match self.storage.get(&Self::key(user))? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| WalletError::Corrupt {
                user: user.to_string(),
                source: e,
            }),
            None => Ok(WalletRecord::default()),
        }
    }

    fn store(&self, user: &str, record: &WalletRecord) -> Result<(), WalletError> {
        let raw = serde_json::to_string(record).map_err(|e| WalletError::Corrupt {
            user: user.to_string(),
            source: e,
        })?;
        Ok(self.storage.put(&Self::key(user), &raw)?)
    }
}
