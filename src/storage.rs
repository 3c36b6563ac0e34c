//! Typed persistence over sled.
//!
//! Each record family lives in its own tree (accounts, bans, admins,
//! settings) instead of sharing one namespace through key prefixes.
//! Account writes go through `update_account`, a compare-and-swap retry
//! loop, so two concurrent read-modify-write sequences can never lose an
//! update.

use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

use crate::error::{LedgerError, StoreError};
use crate::ledger::types::{SettingsRecord, UserAccount};

const SETTINGS_KEY: &[u8] = b"settings";
const CAS_MAX_RETRIES: u32 = 16;

pub struct Store {
    accounts: sled::Tree,
    bans: sled::Tree,
    admins: sled::Tree,
    settings: sled::Tree,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database for tests.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let store = Self {
            accounts: db.open_tree("accounts")?,
            bans: db.open_tree("bans")?,
            admins: db.open_tree("admins")?,
            settings: db.open_tree("settings")?,
        };
        // Seed the settings singleton on first open.
        if store.settings.get(SETTINGS_KEY)?.is_none() {
            store.set_settings(&SettingsRecord::default())?;
        }
        Ok(store)
    }

    // --- Accounts ---

    pub fn account(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        match self.accounts.get(email.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Insert a new account. Returns false (without writing) if one
    /// already exists for this email.
    pub fn create_account(&self, account: &UserAccount) -> Result<bool, StoreError> {
        let encoded = encode(account)?;
        let created = self
            .accounts
            .compare_and_swap(
                account.email.as_bytes(),
                Option::<&[u8]>::None,
                Some(encoded),
            )?
            .is_ok();
        if created {
            self.accounts.flush()?;
        }
        Ok(created)
    }

    /// The sole mutation path for accounts: read, apply, compare-and-swap,
    /// retry on conflict. The closure may reject the update with a typed
    /// error and nothing will be written.
    pub fn update_account<F>(&self, email: &str, mut apply: F) -> Result<UserAccount, LedgerError>
    where
        F: FnMut(&mut UserAccount) -> Result<(), LedgerError>,
    {
        for _ in 0..CAS_MAX_RETRIES {
            let raw = match self.accounts.get(email.as_bytes()).map_err(StoreError::from)? {
                Some(raw) => raw,
                None => return Err(LedgerError::NotFound),
            };
            let mut account: UserAccount = decode(&raw)?;
            apply(&mut account)?;
            let encoded = encode(&account)?;
            let swapped = self
                .accounts
                .compare_and_swap(email.as_bytes(), Some(&raw), Some(encoded))
                .map_err(StoreError::from)?;
            if swapped.is_ok() {
                self.accounts.flush().map_err(StoreError::from)?;
                return Ok(account);
            }
            // Lost the race; reload and try again.
        }
        error!("account update for {} still conflicting after {} retries", email, CAS_MAX_RETRIES);
        Err(StoreError::Contention(CAS_MAX_RETRIES).into())
    }

    // --- Bans ---

    pub fn ban_reason(&self, email: &str) -> Result<Option<String>, StoreError> {
        match self.bans.get(email.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_ban(&self, email: &str, reason: &str) -> Result<(), StoreError> {
        self.bans.insert(email.as_bytes(), encode(&reason.to_string())?)?;
        self.bans.flush()?;
        Ok(())
    }

    pub fn remove_ban(&self, email: &str) -> Result<(), StoreError> {
        self.bans.remove(email.as_bytes())?;
        self.bans.flush()?;
        Ok(())
    }

    // --- Admin flags ---

    pub fn is_admin(&self, email: &str) -> Result<bool, StoreError> {
        match self.admins.get(email.as_bytes())? {
            Some(raw) => decode(&raw),
            None => Ok(false),
        }
    }

    pub fn set_admin(&self, email: &str, flag: bool) -> Result<(), StoreError> {
        self.admins.insert(email.as_bytes(), encode(&flag)?)?;
        self.admins.flush()?;
        Ok(())
    }

    // --- Settings singleton ---

    pub fn settings(&self) -> Result<SettingsRecord, StoreError> {
        match self.settings.get(SETTINGS_KEY)? {
            Some(raw) => decode(&raw),
            None => Ok(SettingsRecord::default()),
        }
    }

    pub fn set_settings(&self, settings: &SettingsRecord) -> Result<(), StoreError> {
        self.settings.insert(SETTINGS_KEY, encode(settings)?)?;
        self.settings.flush()?;
        Ok(())
    }
}
