use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Extra-spec key prefix marking a capability requirement, e.g.
/// `trait:CUSTOM_HW_COMPOSABLE=required`.
pub const TRAIT_SPEC_PREFIX: &str = "trait:";
pub const TRAIT_SPEC_REQUIRED: &str = "required";

/// A named resource template assigned to workloads: vcpus, memory and the
/// extra specs the scheduler attaches to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub vcpus: u32,
    /// Memory in MB.
    pub ram: u64,
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
}

impl Flavor {
    /// Capability names this flavor marks as mandatory via
    /// `trait:NAME=required` extra specs. The value check is
    /// case-insensitive.
    pub fn required_traits(&self) -> impl Iterator<Item = &str> + '_ {
        self.extra_specs.iter().filter_map(|(key, value)| {
            let name = key.strip_prefix(TRAIT_SPEC_PREFIX)?;
            value.eq_ignore_ascii_case(TRAIT_SPEC_REQUIRED).then_some(name)
        })
    }
}

/// Flavor lookup table supplied by the caller, keyed by both id and name
/// so either reference form resolves.
#[derive(Debug, Default, Clone)]
pub struct FlavorCache {
    flavors: HashMap<String, Flavor>,
}

impl FlavorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flavor: Flavor) {
        self.flavors.insert(flavor.id.clone(), flavor.clone());
        self.flavors.insert(flavor.name.clone(), flavor);
    }

    pub fn get(&self, id_or_name: &str) -> Option<&Flavor> {
        self.flavors.get(id_or_name)
    }

    pub fn len(&self) -> usize {
        self.flavors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flavors.is_empty()
    }
}

/// A workload as the planner sees it: where it currently runs and which
/// flavor sizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInstance {
    pub id: String,
    pub name: String,
    pub host: String,
    pub flavor_id: String,
}

/// Detail record fetched per workload. It carries the capability hints
/// that the summary listing does not expose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDetail {
    pub flavor: FlavorRef,
    #[serde(default)]
    pub hci_info: Option<HciInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorRef {
    pub id: String,
}

/// Hardware-composability hints embedded in the workload detail record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HciInfo {
    #[serde(default)]
    pub required_traits: Vec<String>,
}
