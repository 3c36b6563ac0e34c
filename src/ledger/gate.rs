//! Ban / admin authorization preceding every mutating ledger call.

use std::sync::Arc;

use crate::error::LedgerError;
use crate::storage::Store;

#[derive(Clone)]
pub struct AccessGate {
    store: Arc<Store>,
}

impl AccessGate {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The ban check always runs first: a banned admin is still blocked.
    /// Both lookups complete before the caller is allowed to mutate
    /// anything, so rejected calls leave zero observable state change.
    pub fn authorize(&self, email: &str, require_admin: bool) -> Result<(), LedgerError> {
        if email.is_empty() {
            return Err(LedgerError::InvalidParams);
        }
        if let Some(reason) = self.store.ban_reason(email)? {
            return Err(LedgerError::Banned(reason));
        }
        if require_admin && !self.store.is_admin(email)? {
            return Err(LedgerError::Forbidden);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> (AccessGate, Arc<Store>) {
        let store = Arc::new(Store::temporary().unwrap());
        (AccessGate::new(store.clone()), store)
    }

    #[test]
    fn test_plain_user_allowed() {
        let (gate, _store) = gate();
        assert!(gate.authorize("a@b.c", false).is_ok());
    }

    #[test]
    fn test_banned_user_rejected() {
        let (gate, store) = gate();
        store.set_ban("a@b.c", "abuse").unwrap();
        match gate.authorize("a@b.c", false) {
            Err(LedgerError::Banned(reason)) => assert_eq!(reason, "abuse"),
            other => panic!("expected Banned, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_banned_admin_still_rejected() {
        let (gate, store) = gate();
        store.set_admin("a@b.c", true).unwrap();
        store.set_ban("a@b.c", "abuse").unwrap();
        assert!(matches!(
            gate.authorize("a@b.c", true),
            Err(LedgerError::Banned(_))
        ));
    }

    #[test]
    fn test_admin_requirement() {
        let (gate, store) = gate();
        assert!(matches!(
            gate.authorize("a@b.c", true),
            Err(LedgerError::Forbidden)
        ));
        store.set_admin("a@b.c", true).unwrap();
        assert!(gate.authorize("a@b.c", true).is_ok());
    }

    #[test]
    fn test_empty_email_invalid() {
        let (gate, _store) = gate();
        assert!(matches!(
            gate.authorize("", false),
            Err(LedgerError::InvalidParams)
        ));
    }
}
