//! Ledger type definitions: accounts, resources, settings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// The six provisionable capacity dimensions a plan or purchase can grant.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Ram,
    Disk,
    Backup,
    Database,
    Allocation,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Cpu,
        ResourceKind::Ram,
        ResourceKind::Disk,
        ResourceKind::Backup,
        ResourceKind::Database,
        ResourceKind::Allocation,
    ];

    /// How many raw units one purchased unit is worth.
    /// CPU is sold in whole cores (100%), RAM and disk in GiB (1024 MiB).
    pub fn multiplier(self) -> u64 {
        match self {
            ResourceKind::Cpu => 100,
            ResourceKind::Ram | ResourceKind::Disk => 1024,
            ResourceKind::Backup | ResourceKind::Database | ResourceKind::Allocation => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Ram => "ram",
            ResourceKind::Disk => "disk",
            ResourceKind::Backup => "backup",
            ResourceKind::Database => "database",
            ResourceKind::Allocation => "allocation",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ResourceKind::Cpu),
            "ram" => Ok(ResourceKind::Ram),
            "disk" => Ok(ResourceKind::Disk),
            "backup" => Ok(ResourceKind::Backup),
            "database" => Ok(ResourceKind::Database),
            "allocation" => Ok(ResourceKind::Allocation),
            _ => Err(LedgerError::InvalidParams),
        }
    }
}

/// Per-account resource balances. Values are raw units (cpu %, MiB, counts)
/// and can never go negative.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceSet {
    pub cpu: u64,
    pub ram: u64,
    pub disk: u64,
    pub backup: u64,
    pub database: u64,
    pub allocation: u64,
}

impl ResourceSet {
    pub fn get(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cpu => self.cpu,
            ResourceKind::Ram => self.ram,
            ResourceKind::Disk => self.disk,
            ResourceKind::Backup => self.backup,
            ResourceKind::Database => self.database,
            ResourceKind::Allocation => self.allocation,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut u64 {
        match kind {
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Ram => &mut self.ram,
            ResourceKind::Disk => &mut self.disk,
            ResourceKind::Backup => &mut self.backup,
            ResourceKind::Database => &mut self.database,
            ResourceKind::Allocation => &mut self.allocation,
        }
    }
}

/// Baseline allotment every freshly registered account starts with.
pub const DEFAULT_RESOURCES: ResourceSet = ResourceSet {
    cpu: 100,
    ram: 1024,
    disk: 10240,
    backup: 2,
    database: 2,
    allocation: 2,
};

/// One ledger account per email.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserAccount {
    pub email: String,
    pub username: String,
    /// Opaque id assigned by the external provisioning panel.
    pub external_id: u64,
    pub coins: u64,
    pub resources: ResourceSet,
    /// Canonical (uppercase) plan name, if subscribed.
    pub plan: Option<String>,
    pub last_daily_claim: Option<NaiveDate>,
}

impl UserAccount {
    pub fn new(email: String, username: String, external_id: u64) -> Self {
        Self {
            email,
            username,
            external_id,
            coins: 0,
            resources: DEFAULT_RESOURCES,
            plan: None,
            last_daily_claim: None,
        }
    }
}

/// Process-wide feature toggles, persisted as a singleton record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SettingsRecord {
    pub daily_coins_enabled: bool,
    pub daily_coins: u64,
    pub maintenance: bool,
    pub join_guild_enabled: bool,
    pub join_guild_id: String,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            daily_coins_enabled: true,
            daily_coins: 5,
            maintenance: false,
            join_guild_enabled: false,
            join_guild_id: String::new(),
        }
    }
}
