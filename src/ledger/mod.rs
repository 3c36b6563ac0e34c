//! The authoritative record of account coin and resource balances and the
//! operations that mutate it.

pub mod gate;
pub mod service;
pub mod types;

pub use gate::AccessGate;
pub use service::{LedgerService, SettingsUpdate};
pub use types::{ResourceKind, ResourceSet, SettingsRecord, UserAccount};
