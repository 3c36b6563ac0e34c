use serde::{Deserialize, Serialize};

use crate::ledger::types::ResourceKind;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AtlasConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub economy: EconomyConfig,
    pub provider: ProviderConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub rpc_port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    pub db_path: String,
    #[serde(default = "default_plans_file")]
    pub plans_file: String,
}

fn default_plans_file() -> String {
    "plans.json".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EconomyConfig {
    /// Seconds of open AFK session per earned coin.
    pub afk_interval_secs: u64,
    pub costs: ResourceCosts,
}

/// Coin price of one purchased unit, per resource.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResourceCosts {
    pub cpu: u64,
    pub ram: u64,
    pub disk: u64,
    pub backup: u64,
    pub database: u64,
    pub allocation: u64,
}

impl ResourceCosts {
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
}

impl Default for ResourceCosts {
    fn default() -> Self {
        Self { cpu: 10, ram: 10, disk: 10, backup: 5, database: 5, allocation: 5 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    pub discord_webhook_url: Option<String>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                rpc_port: 8700,
                log_level: "info".to_string(),
            },
            store: StoreConfig {
                db_path: "./data/atlas".to_string(),
                plans_file: default_plans_file(),
            },
            economy: EconomyConfig {
                afk_interval_secs: 60,
                costs: ResourceCosts::default(),
            },
            provider: ProviderConfig {
                url: "http://localhost:8080".to_string(),
                api_key: String::new(),
            },
            notifications: NotificationConfig { discord_webhook_url: None },
        }
    }
}

impl AtlasConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        println!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        eprintln!("Error parsing config: {}. Using Defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Error reading config: {}. Using Defaults.", e);
                    Self::default()
                }
            }
        } else {
            println!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }
}
