//! Read-only store of canonical test scenarios keyed by id.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::types::Scenario;

/// Scenarios loaded for a run. Never mutated after construction; share it
/// between workers behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ScenarioStore {
    scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate or empty ids.
    pub fn from_scenarios(
        scenarios: impl IntoIterator<Item = Scenario>,
    ) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for scenario in scenarios {
            if scenario.id.trim().is_empty() {
                return Err(ConfigError::invalid("scenario with empty id"));
            }
            if map.contains_key(&scenario.id) {
                return Err(ConfigError::invalid(format!(
                    "duplicate scenario id '{}'",
                    scenario.id
                )));
            }
            map.insert(scenario.id.clone(), scenario);
        }
        Ok(Self { scenarios: map })
    }

    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenarios.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Iterate scenarios in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }
}
