use thiserror::Error;

/// Failures surfaced by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Write conflict persisted after {0} retries")]
    Contention(u32),
}

/// Typed results for every ledger operation. Validation failures are
/// returned to the caller; storage internals are never exposed through
/// the message of `Store`.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found")]
    NotFound,
    #[error("Missing or malformed parameters")]
    InvalidParams,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Not enough coins")]
    InsufficientBalance,
    #[error("Daily coins already claimed today")]
    AlreadyClaimed,
    #[error("Already subscribed to this plan")]
    AlreadyOnPlan,
    #[error("An accrual session is already active for this account")]
    AlreadyActive,
    #[error("Account is banned: {0}")]
    Banned(String),
    #[error("Admin access required")]
    Forbidden,
    #[error("This feature is currently disabled")]
    FeatureDisabled,
    #[error("Identity provisioning failed: {0}")]
    Provider(String),
    #[error("Storage failure")]
    Store(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::Store(err)
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Store(StoreError::Database(err))
    }
}

impl LedgerError {
    /// Stable machine-readable code, used by the RPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound => "NOT_FOUND",
            LedgerError::InvalidParams => "INVALID_PARAMS",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::AlreadyClaimed => "ALREADY_CLAIMED",
            LedgerError::AlreadyOnPlan => "ALREADY_ON_PLAN",
            LedgerError::AlreadyActive => "ALREADY_ACTIVE",
            LedgerError::Banned(_) => "BANNED",
            LedgerError::Forbidden => "FORBIDDEN",
            LedgerError::FeatureDisabled => "FEATURE_DISABLED",
            LedgerError::Provider(_) => "PROVIDER_FAILURE",
            LedgerError::Store(_) => "STORE_FAILURE",
        }
    }
}
