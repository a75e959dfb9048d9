//! Feature-gate collaborator.

use std::collections::BTreeMap;

use tracing::warn;

/// Gate protecting the managed (AKS) kinds.
pub const MACHINE_POOL: &str = "MachinePool";

/// Known gates and their defaults.
const KNOWN_GATES: &[(&str, bool)] = &[(MACHINE_POOL, true)];

/// Boolean feature-gate query.
pub trait FeatureGates: Send + Sync {
    fn enabled(&self, feature: &str) -> bool;
}

/// Gates fixed at process start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticFeatureGates {
    gates: BTreeMap<String, bool>,
}

impl Default for StaticFeatureGates {
    fn default() -> Self {
        Self {
            gates: KNOWN_GATES
                .iter()
                .map(|(name, on)| (name.to_string(), *on))
                .collect(),
        }
    }
}

impl StaticFeatureGates {
    /// Parse `Name=true,Other=false` on top of the defaults.
    ///
    /// Malformed entries are skipped with a warning.
    pub fn parse(spec: &str) -> Self {
        let mut gates = Self::default();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((name, value)) = entry.split_once('=') else {
                warn!(entry, "Ignoring feature gate without a value");
                continue;
            };
            match value.trim().parse::<bool>() {
                Ok(on) => {
                    gates.gates.insert(name.trim().to_string(), on);
                }
                Err(_) => warn!(entry, "Ignoring feature gate with a non-boolean value"),
            }
        }
        gates
    }

    pub fn set(mut self, feature: &str, on: bool) -> Self {
        self.gates.insert(feature.to_string(), on);
        self
    }
}

impl FeatureGates for StaticFeatureGates {
    fn enabled(&self, feature: &str) -> bool {
        self.gates.get(feature).copied().unwrap_or(false)
    }
}
