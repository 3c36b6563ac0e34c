//! Static registry of purchasable plans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ledger::types::{ResourceKind, ResourceSet};

/// A named bundle of baseline resource allocations, purchasable with coins.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanDefinition {
    pub id: u32,
    pub name: String,
    pub price: u64,
    pub resources: ResourceSet,
}

#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: Vec<PlanDefinition>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<PlanDefinition>) -> Self {
        Self { plans }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(raw)?))
    }

    /// Load the catalog from a JSON file, falling back to the built-in
    /// plan set when the file is absent or unreadable.
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match Self::from_json(&raw) {
                Ok(catalog) => catalog,
                Err(e) => {
                    warn!("Error parsing plans file {}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn by_id(&self, id: u32) -> Option<&PlanDefinition> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&PlanDefinition> {
        self.plans.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn all(&self) -> &[PlanDefinition] {
        &self.plans
    }

    /// Per-resource difference between two plan baselines. An absent old
    /// plan counts as a zero baseline, so first-time subscriptions grant
    /// the full allotment of the target plan.
    pub fn delta(
        &self,
        old: Option<&PlanDefinition>,
        new: &PlanDefinition,
    ) -> HashMap<ResourceKind, i64> {
        let mut diff = HashMap::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let before = old.map(|p| p.resources.get(kind)).unwrap_or(0) as i64;
            let after = new.resources.get(kind) as i64;
            diff.insert(kind, after - before);
        }
        diff
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new(vec![
            PlanDefinition {
                id: 1,
                name: "STARTER".to_string(),
                price: 100,
                resources: ResourceSet {
                    cpu: 200,
                    ram: 2048,
                    disk: 15360,
                    backup: 3,
                    database: 3,
                    allocation: 3,
                },
            },
            PlanDefinition {
                id: 2,
                name: "PRO".to_string(),
                price: 250,
                resources: ResourceSet {
                    cpu: 400,
                    ram: 4096,
                    disk: 30720,
                    backup: 5,
                    database: 5,
                    allocation: 5,
                },
            },
            PlanDefinition {
                id: 3,
                name: "ELITE".to_string(),
                price: 600,
                resources: ResourceSet {
                    cpu: 800,
                    ram: 8192,
                    disk: 61440,
                    backup: 10,
                    database: 10,
                    allocation: 10,
                },
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = PlanCatalog::default();
        assert_eq!(catalog.by_id(1).unwrap().name, "STARTER");
        assert!(catalog.by_id(99).is_none());
        assert_eq!(catalog.by_name("pro").unwrap().id, 2);
        assert_eq!(catalog.by_name("PRO").unwrap().id, 2);
    }

    #[test]
    fn test_delta_between_plans() {
        let catalog = PlanCatalog::default();
        let starter = catalog.by_id(1).unwrap();
        let pro = catalog.by_id(2).unwrap();

        let up = catalog.delta(Some(starter), pro);
        assert_eq!(up[&ResourceKind::Cpu], 200);
        assert_eq!(up[&ResourceKind::Ram], 2048);

        let down = catalog.delta(Some(pro), starter);
        assert_eq!(down[&ResourceKind::Cpu], -200);
        assert_eq!(down[&ResourceKind::Disk], -15360);
    }

    #[test]
    fn test_delta_from_no_plan() {
        let catalog = PlanCatalog::default();
        let starter = catalog.by_id(1).unwrap();
        let delta = catalog.delta(None, starter);
        assert_eq!(delta[&ResourceKind::Cpu], 200);
        assert_eq!(delta[&ResourceKind::Backup], 3);
    }

    #[test]
    fn test_from_json() {
        let raw = r#"[{"id":9,"name":"NANO","price":10,
            "resources":{"cpu":50,"ram":512,"disk":1024,"backup":1,"database":1,"allocation":1}}]"#;
        let catalog = PlanCatalog::from_json(raw).unwrap();
        assert_eq!(catalog.all().len(), 1);
        assert_eq!(catalog.by_name("nano").unwrap().price, 10);
    }
}
