//! Read-modify-write operations on account balances, plans, and daily
//! claims. Every mutating entry point runs the access gate to completion
//! before touching the store, and every account mutation is a single
//! compare-and-swap through `Store::update_account`.
//!
//! `credit_coins`, `purchase_resource`, and `grant_resources` are not
//! idempotent: a caller retrying a timed-out request can double-apply.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::catalog::PlanCatalog;
use crate::config::ResourceCosts;
use crate::error::LedgerError;
use crate::external::{IdentityProvider, NotificationSink};
use crate::ledger::gate::AccessGate;
use crate::ledger::types::{ResourceKind, ResourceSet, SettingsRecord, UserAccount};
use crate::storage::Store;

/// Policy cap on units per purchase call.
pub const MAX_UNITS_PER_PURCHASE: u64 = 10;

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Default, Clone)]
pub struct SettingsUpdate {
    pub daily_coins_enabled: Option<bool>,
    pub daily_coins: Option<u64>,
    pub maintenance: Option<bool>,
    pub join_guild_enabled: Option<bool>,
    pub join_guild_id: Option<String>,
}

pub struct LedgerService {
    store: Arc<Store>,
    catalog: PlanCatalog,
    gate: AccessGate,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn NotificationSink>,
    costs: ResourceCosts,
}

impl LedgerService {
    pub fn new(
        store: Arc<Store>,
        catalog: PlanCatalog,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn NotificationSink>,
        costs: ResourceCosts,
    ) -> Self {
        Self {
            gate: AccessGate::new(store.clone()),
            store,
            catalog,
            identity,
            notifier,
            costs,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Read an account, subject to the ban check.
    pub fn account(&self, email: &str) -> Result<UserAccount, LedgerError> {
        self.gate.authorize(email, false)?;
        self.store.account(email)?.ok_or(LedgerError::NotFound)
    }

    pub fn settings(&self) -> Result<SettingsRecord, LedgerError> {
        Ok(self.store.settings()?)
    }

    // --- Registration ---

    /// Create the ledger account for an email, provisioning the external
    /// panel identity first. Registration happens once; a second call for
    /// the same email returns the existing account untouched.
    pub async fn register(&self, email: &str, username: &str) -> Result<UserAccount, LedgerError> {
        if email.is_empty() || !email.contains('@') || username.is_empty() {
            return Err(LedgerError::InvalidParams);
        }
        self.gate.authorize(email, false)?;

        if let Some(existing) = self.store.account(email)? {
            return Ok(existing);
        }

        let external_id = self
            .identity
            .ensure_user(email, username)
            .await
            .map_err(LedgerError::Provider)?;

        let account = UserAccount::new(email.to_string(), username.to_string(), external_id);
        if !self.store.create_account(&account)? {
            // Raced with a concurrent registration for the same email.
            return self.store.account(email)?.ok_or(LedgerError::NotFound);
        }
        info!("Registered {} (panel id {})", username, external_id);
        Ok(account)
    }

    // --- Coin operations ---

    /// Add coins to an account. Used by the AFK accrual engine and the
    /// daily-claim flow; the delta must be positive.
    pub async fn credit_coins(&self, email: &str, delta: u64) -> Result<UserAccount, LedgerError> {
        if delta == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.gate.authorize(email, false)?;
        self.store.update_account(email, |account| {
            account.coins = account
                .coins
                .checked_add(delta)
                .ok_or(LedgerError::InvalidAmount)?;
            Ok(())
        })
    }

    /// Admin-only variant of a coin credit against an arbitrary account.
    pub async fn add_coins(
        &self,
        actor: &str,
        email: &str,
        delta: u64,
    ) -> Result<UserAccount, LedgerError> {
        if delta == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.gate.authorize(actor, true)?;
        let account = self.store.update_account(email, |account| {
            account.coins = account
                .coins
                .checked_add(delta)
                .ok_or(LedgerError::InvalidAmount)?;
            Ok(())
        })?;
        self.notifier
            .notify(
                "add coins",
                &format!("{} has added `{}` coins for `{}` !", actor, delta, email),
            )
            .await;
        Ok(account)
    }

    /// Admin-only: replace the coin balance outright.
    pub async fn set_coins(
        &self,
        actor: &str,
        email: &str,
        amount: u64,
    ) -> Result<UserAccount, LedgerError> {
        self.gate.authorize(actor, true)?;
        let account = self.store.update_account(email, |account| {
            account.coins = amount;
            Ok(())
        })?;
        self.notifier
            .notify(
                "set coins",
                &format!("{} has set `{}` coins for `{}` !", actor, amount, email),
            )
            .await;
        Ok(account)
    }

    // --- Resource operations ---

    /// Admin-only: add signed deltas to the current resource values.
    /// Rejected with `InvalidAmount` if any resulting value would go
    /// negative or overflow; nothing is written in that case.
    pub async fn grant_resources(
        &self,
        actor: &str,
        email: &str,
        deltas: &HashMap<ResourceKind, i64>,
    ) -> Result<UserAccount, LedgerError> {
        if deltas.is_empty() {
            return Err(LedgerError::InvalidParams);
        }
        self.gate.authorize(actor, true)?;
        let account = self.store.update_account(email, |account| {
            for (&kind, &delta) in deltas {
                let current = account.resources.get(kind) as i64;
                let next = current
                    .checked_add(delta)
                    .filter(|v| *v >= 0)
                    .ok_or(LedgerError::InvalidAmount)?;
                *account.resources.get_mut(kind) = next as u64;
            }
            Ok(())
        })?;
        self.notifier
            .notify("add resources", &format!("{} has added resources for {} !", actor, email))
            .await;
        Ok(account)
    }

    /// Admin-only: replace every resource value.
    pub async fn set_resources(
        &self,
        actor: &str,
        email: &str,
        absolutes: ResourceSet,
    ) -> Result<UserAccount, LedgerError> {
        self.gate.authorize(actor, true)?;
        let account = self.store.update_account(email, |account| {
            account.resources = absolutes;
            Ok(())
        })?;
        self.notifier
            .notify("set resources", &format!("{} has set resources for {} !", actor, email))
            .await;
        Ok(account)
    }

    /// Buy raw resource units with coins. Cost is `unit_cost * units`,
    /// the gained amount is `multiplier * units`; deduction and grant
    /// happen in one compare-and-swap.
    pub async fn purchase_resource(
        &self,
        email: &str,
        kind: ResourceKind,
        units: u64,
    ) -> Result<UserAccount, LedgerError> {
        if units == 0 || units > MAX_UNITS_PER_PURCHASE {
            return Err(LedgerError::InvalidAmount);
        }
        self.gate.authorize(email, false)?;
        let cost = self
            .costs
            .get(kind)
            .checked_mul(units)
            .ok_or(LedgerError::InvalidAmount)?;
        let gain = kind.multiplier() * units;

        let account = self.store.update_account(email, |account| {
            if account.coins < cost {
                return Err(LedgerError::InsufficientBalance);
            }
            account.coins -= cost;
            let slot = account.resources.get_mut(kind);
            *slot = slot.checked_add(gain).ok_or(LedgerError::InvalidAmount)?;
            Ok(())
        })?;
        self.notifier
            .notify(
                "resources purchased",
                &format!(
                    "{} has purchased `{} {}` !",
                    account.username,
                    gain,
                    kind.as_str().to_uppercase()
                ),
            )
            .await;
        Ok(account)
    }

    // --- Plans ---

    /// Switch to another plan. The plan delta is applied additively
    /// against the account's live resource values, so any manually
    /// granted surplus above the old baseline survives the switch.
    pub async fn change_plan(&self, email: &str, plan_id: u32) -> Result<UserAccount, LedgerError> {
        self.gate.authorize(email, false)?;
        let target = self.catalog.by_id(plan_id).ok_or(LedgerError::NotFound)?;

        let account = self.store.update_account(email, |account| {
            if account.plan.as_deref() == Some(target.name.as_str()) {
                return Err(LedgerError::AlreadyOnPlan);
            }
            if account.coins < target.price {
                return Err(LedgerError::InsufficientBalance);
            }
            let current = account
                .plan
                .as_deref()
                .and_then(|name| self.catalog.by_name(name));
            for (kind, delta) in self.catalog.delta(current, target) {
                let live = account.resources.get(kind) as i64;
                // Clamp at zero: balances never go negative, even when an
                // admin has set a value below the old plan baseline.
                *account.resources.get_mut(kind) = live.saturating_add(delta).max(0) as u64;
            }
            account.coins -= target.price;
            account.plan = Some(target.name.clone());
            Ok(())
        })?;
        self.notifier
            .notify(
                "plan purchased",
                &format!("{} has purchased `{}` Plan !", account.username, target.name),
            )
            .await;
        Ok(account)
    }

    // --- Daily claim ---

    /// Claim the configured daily coins, at most once per UTC calendar day.
    pub async fn claim_daily(&self, email: &str) -> Result<UserAccount, LedgerError> {
        self.claim_daily_on(email, Utc::now().date_naive()).await
    }

    pub(crate) async fn claim_daily_on(
        &self,
        email: &str,
        today: NaiveDate,
    ) -> Result<UserAccount, LedgerError> {
        self.gate.authorize(email, false)?;
        let settings = self.store.settings()?;
        self.store.update_account(email, |account| {
            // The claim date is monotonically non-decreasing.
            if account.last_daily_claim.is_some_and(|d| d >= today) {
                return Err(LedgerError::AlreadyClaimed);
            }
            if !settings.daily_coins_enabled {
                return Err(LedgerError::FeatureDisabled);
            }
            account.coins = account
                .coins
                .checked_add(settings.daily_coins)
                .ok_or(LedgerError::InvalidAmount)?;
            account.last_daily_claim = Some(today);
            Ok(())
        })
    }

    // --- Bans ---

    pub async fn ban(&self, actor: &str, email: &str, reason: &str) -> Result<(), LedgerError> {
        if email.is_empty() {
            return Err(LedgerError::InvalidParams);
        }
        self.gate.authorize(actor, true)?;
        self.store.set_ban(email, reason)?;
        self.notifier
            .notify("ban", &format!("{} has banned `{}`: `{}` !", actor, email, reason))
            .await;
        Ok(())
    }

    pub async fn unban(&self, actor: &str, email: &str) -> Result<(), LedgerError> {
        if email.is_empty() {
            return Err(LedgerError::InvalidParams);
        }
        self.gate.authorize(actor, true)?;
        self.store.remove_ban(email)?;
        self.notifier
            .notify("unban", &format!("{} has unbanned `{}` !", actor, email))
            .await;
        Ok(())
    }

    // --- Settings ---

    pub async fn update_settings(
        &self,
        actor: &str,
        update: SettingsUpdate,
    ) -> Result<SettingsRecord, LedgerError> {
        self.gate.authorize(actor, true)?;
        let mut settings = self.store.settings()?;
        if let Some(v) = update.daily_coins_enabled {
            settings.daily_coins_enabled = v;
        }
        if let Some(v) = update.daily_coins {
            settings.daily_coins = v;
        }
        if let Some(v) = update.maintenance {
            settings.maintenance = v;
        }
        if let Some(v) = update.join_guild_enabled {
            settings.join_guild_enabled = v;
        }
        if let Some(v) = update.join_guild_id {
            settings.join_guild_id = v;
        }
        self.store.set_settings(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::testing::{CapturingSink, StubIdentity};

    const ADMIN: &str = "root@atlas.gg";

    fn service() -> (LedgerService, Arc<Store>) {
        let store = Arc::new(Store::temporary().unwrap());
        store.set_admin(ADMIN, true).unwrap();
        let ledger = LedgerService::new(
            store.clone(),
            PlanCatalog::default(),
            Arc::new(StubIdentity::new()),
            Arc::new(CapturingSink::default()),
            ResourceCosts::default(),
        );
        (ledger, store)
    }

    async fn registered(ledger: &LedgerService, email: &str) -> UserAccount {
        ledger.register(email, "tester").await.unwrap()
    }

    #[tokio::test]
    async fn test_register_once() {
        let (ledger, _store) = service();
        let first = registered(&ledger, "u1@x.y").await;
        assert_eq!(first.resources.cpu, 100);
        assert_eq!(first.coins, 0);

        // A second registration keeps the existing record.
        ledger.credit_coins("u1@x.y", 7).await.unwrap();
        let again = ledger.register("u1@x.y", "tester").await.unwrap();
        assert_eq!(again.coins, 7);
        assert_eq!(again.external_id, first.external_id);
    }

    #[tokio::test]
    async fn test_register_validates_params() {
        let (ledger, _store) = service();
        assert!(matches!(
            ledger.register("not-an-email", "x").await,
            Err(LedgerError::InvalidParams)
        ));
        assert!(matches!(
            ledger.register("a@b.c", "").await,
            Err(LedgerError::InvalidParams)
        ));
    }

    #[tokio::test]
    async fn test_credit_unknown_account() {
        let (ledger, _store) = service();
        assert!(matches!(
            ledger.credit_coins("ghost@x.y", 1).await,
            Err(LedgerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_credit_zero_rejected() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        assert!(matches!(
            ledger.credit_coins("u1@x.y", 0).await,
            Err(LedgerError::InvalidAmount)
        ));
    }

    #[tokio::test]
    async fn test_purchase_arithmetic() {
        // unit_cost.cpu = 10, coins = 25, buy 2 units:
        // coins 25 -> 5, cpu += 2 * 100.
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger.set_coins(ADMIN, "u1@x.y", 25).await.unwrap();

        let account = ledger
            .purchase_resource("u1@x.y", ResourceKind::Cpu, 2)
            .await
            .unwrap();
        assert_eq!(account.coins, 5);
        assert_eq!(account.resources.cpu, 100 + 200);
    }

    #[tokio::test]
    async fn test_purchase_unit_cap() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger.set_coins(ADMIN, "u1@x.y", 100_000).await.unwrap();
        assert!(matches!(
            ledger.purchase_resource("u1@x.y", ResourceKind::Ram, 11).await,
            Err(LedgerError::InvalidAmount)
        ));
        assert!(matches!(
            ledger.purchase_resource("u1@x.y", ResourceKind::Ram, 0).await,
            Err(LedgerError::InvalidAmount)
        ));
    }

    #[tokio::test]
    async fn test_purchase_insufficient_balance_mutates_nothing() {
        let (ledger, store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger.set_coins(ADMIN, "u1@x.y", 5).await.unwrap();
        let before = store.account("u1@x.y").unwrap().unwrap();

        assert!(matches!(
            ledger.purchase_resource("u1@x.y", ResourceKind::Cpu, 1).await,
            Err(LedgerError::InsufficientBalance)
        ));
        assert_eq!(store.account("u1@x.y").unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_grant_and_set_resources_admin_only() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        let deltas = HashMap::from([(ResourceKind::Backup, 3i64)]);
        assert!(matches!(
            ledger.grant_resources("u1@x.y", "u1@x.y", &deltas).await,
            Err(LedgerError::Forbidden)
        ));

        let account = ledger.grant_resources(ADMIN, "u1@x.y", &deltas).await.unwrap();
        assert_eq!(account.resources.backup, 5);

        let account = ledger
            .set_resources(ADMIN, "u1@x.y", ResourceSet { cpu: 50, ..account.resources })
            .await
            .unwrap();
        assert_eq!(account.resources.cpu, 50);
    }

    #[tokio::test]
    async fn test_grant_underflow_rejected() {
        let (ledger, store) = service();
        registered(&ledger, "u1@x.y").await;
        let deltas = HashMap::from([(ResourceKind::Database, -10i64)]);
        assert!(matches!(
            ledger.grant_resources(ADMIN, "u1@x.y", &deltas).await,
            Err(LedgerError::InvalidAmount)
        ));
        // Default database allotment untouched.
        assert_eq!(store.account("u1@x.y").unwrap().unwrap().resources.database, 2);
    }

    #[tokio::test]
    async fn test_change_plan_and_round_trip() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger.set_coins(ADMIN, "u1@x.y", 10_000).await.unwrap();

        let on_starter = ledger.change_plan("u1@x.y", 1).await.unwrap();
        assert_eq!(on_starter.plan.as_deref(), Some("STARTER"));
        // 100 baseline cpu + 200 plan allotment.
        assert_eq!(on_starter.resources.cpu, 300);

        // A manual grant above the baseline must survive plan switches.
        let granted = ledger
            .grant_resources(ADMIN, "u1@x.y", &HashMap::from([(ResourceKind::Cpu, 40i64)]))
            .await
            .unwrap();

        let on_pro = ledger.change_plan("u1@x.y", 2).await.unwrap();
        assert_eq!(on_pro.resources.cpu, granted.resources.cpu + 200);

        let back = ledger.change_plan("u1@x.y", 1).await.unwrap();
        assert_eq!(back.resources, granted.resources);
        assert_eq!(back.plan.as_deref(), Some("STARTER"));
    }

    #[tokio::test]
    async fn test_change_plan_errors() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;

        assert!(matches!(
            ledger.change_plan("u1@x.y", 99).await,
            Err(LedgerError::NotFound)
        ));
        assert!(matches!(
            ledger.change_plan("u1@x.y", 1).await,
            Err(LedgerError::InsufficientBalance)
        ));

        ledger.set_coins(ADMIN, "u1@x.y", 500).await.unwrap();
        ledger.change_plan("u1@x.y", 1).await.unwrap();
        assert!(matches!(
            ledger.change_plan("u1@x.y", 1).await,
            Err(LedgerError::AlreadyOnPlan)
        ));
    }

    #[tokio::test]
    async fn test_daily_claim_idempotent_per_day() {
        let (ledger, store) = service();
        registered(&ledger, "u1@x.y").await;
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();

        let account = ledger.claim_daily_on("u1@x.y", today).await.unwrap();
        let claimed = account.coins;
        assert_eq!(claimed, store.settings().unwrap().daily_coins);
        assert_eq!(account.last_daily_claim, Some(today));

        assert!(matches!(
            ledger.claim_daily_on("u1@x.y", today).await,
            Err(LedgerError::AlreadyClaimed)
        ));
        assert_eq!(store.account("u1@x.y").unwrap().unwrap().coins, claimed);

        // Next day works again; claim date never moves backwards.
        let tomorrow = today.succ_opt().unwrap();
        let account = ledger.claim_daily_on("u1@x.y", tomorrow).await.unwrap();
        assert_eq!(account.coins, claimed * 2);
        assert!(matches!(
            ledger.claim_daily_on("u1@x.y", today).await,
            Err(LedgerError::AlreadyClaimed)
        ));
    }

    #[tokio::test]
    async fn test_daily_claim_feature_disabled() {
        let (ledger, _store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger
            .update_settings(
                ADMIN,
                SettingsUpdate { daily_coins_enabled: Some(false), ..Default::default() },
            )
            .await
            .unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert!(matches!(
            ledger.claim_daily_on("u1@x.y", today).await,
            Err(LedgerError::FeatureDisabled)
        ));
    }

    #[tokio::test]
    async fn test_banned_account_mutates_nothing() {
        let (ledger, store) = service();
        registered(&ledger, "u1@x.y").await;
        ledger.set_coins(ADMIN, "u1@x.y", 50).await.unwrap();
        ledger.ban(ADMIN, "u1@x.y", "chargeback").await.unwrap();
        let before = store.account("u1@x.y").unwrap().unwrap();

        assert!(matches!(
            ledger.credit_coins("u1@x.y", 5).await,
            Err(LedgerError::Banned(_))
        ));
        assert!(matches!(
            ledger.purchase_resource("u1@x.y", ResourceKind::Cpu, 1).await,
            Err(LedgerError::Banned(_))
        ));
        assert!(matches!(
            ledger.claim_daily("u1@x.y").await,
            Err(LedgerError::Banned(_))
        ));
        assert_eq!(store.account("u1@x.y").unwrap().unwrap(), before);

        ledger.unban(ADMIN, "u1@x.y").await.unwrap();
        assert!(ledger.credit_coins("u1@x.y", 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_banned_admin_blocked() {
        let (ledger, store) = service();
        registered(&ledger, "u1@x.y").await;
        store.set_ban(ADMIN, "gone rogue").unwrap();
        assert!(matches!(
            ledger.set_coins(ADMIN, "u1@x.y", 1).await,
            Err(LedgerError::Banned(_))
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (ledger, _store) = service();
        let account = registered(&ledger, "u1@x.y").await;
        assert_eq!(account.coins, 0);
        assert_eq!(account.resources.cpu, 100);

        let account = ledger.credit_coins("u1@x.y", 5).await.unwrap();
        assert_eq!(account.coins, 5);

        assert!(matches!(
            ledger.purchase_resource("u1@x.y", ResourceKind::Cpu, 1).await,
            Err(LedgerError::InsufficientBalance)
        ));
        assert_eq!(ledger.account("u1@x.y").unwrap().coins, 5);

        let account = ledger.credit_coins("u1@x.y", 10).await.unwrap();
        assert_eq!(account.coins, 15);

        let account = ledger
            .purchase_resource("u1@x.y", ResourceKind::Cpu, 1)
            .await
            .unwrap();
        assert_eq!(account.coins, 5);
        assert_eq!(account.resources.cpu, 200);
    }

    #[tokio::test]
    async fn test_purchase_emits_notification() {
        let store = Arc::new(Store::temporary().unwrap());
        store.set_admin(ADMIN, true).unwrap();
        let sink = Arc::new(CapturingSink::default());
        let ledger = LedgerService::new(
            store,
            PlanCatalog::default(),
            Arc::new(StubIdentity::new()),
            sink.clone(),
            ResourceCosts::default(),
        );
        ledger.register("u1@x.y", "tester").await.unwrap();
        ledger.set_coins(ADMIN, "u1@x.y", 100).await.unwrap();
        ledger
            .purchase_resource("u1@x.y", ResourceKind::Ram, 2)
            .await
            .unwrap();

        let events = sink.events.lock().unwrap();
        let purchase = events.iter().find(|(t, _)| t == "resources purchased").unwrap();
        assert!(purchase.1.contains("2048 RAM"));
    }

    #[tokio::test]
    async fn test_update_settings() {
        let (ledger, _store) = service();
        let settings = ledger
            .update_settings(
                ADMIN,
                SettingsUpdate {
                    daily_coins: Some(12),
                    maintenance: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(settings.daily_coins, 12);
        assert!(settings.maintenance);
        assert!(settings.daily_coins_enabled);

        assert!(matches!(
            ledger.update_settings("u1@x.y", SettingsUpdate::default()).await,
            Err(LedgerError::Forbidden)
        ));
    }
}
