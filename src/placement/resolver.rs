use std::collections::HashSet;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::vm::{FlavorCache, VmInstance};
use crate::placement::cache::SessionCache;
use crate::placement::{ComputeClient, Lookup, PlacementClient};

/// Resolves hostnames to capability traits through the placement service.
///
/// Two session-scoped caches back the resolver: hostname to provider id,
/// and hostname to trait set. Only definitive outcomes are cached; an
/// `Unavailable` lookup is retried on the next call.
pub struct TraitResolver<'a, P, C> {
    placement: &'a P,
    compute: &'a C,
    flavors: &'a FlavorCache,
    provider_ids: SessionCache<String, Uuid>,
    host_traits: SessionCache<String, HashSet<String>>,
}

impl<'a, P: PlacementClient, C: ComputeClient> TraitResolver<'a, P, C> {
    pub fn new(placement: &'a P, compute: &'a C, flavors: &'a FlavorCache) -> Self {
        Self::with_caches(placement, compute, flavors, SessionCache::new(), SessionCache::new())
    }

    /// Build with caller-supplied caches, e.g. pre-warmed from an earlier
    /// pass over the same inventory snapshot.
    pub fn with_caches(
        placement: &'a P,
        compute: &'a C,
        flavors: &'a FlavorCache,
        provider_ids: SessionCache<String, Uuid>,
        host_traits: SessionCache<String, HashSet<String>>,
    ) -> Self {
        Self {
            placement,
            compute,
            flavors,
            provider_ids,
            host_traits,
        }
    }

    /// Drop everything cached for one host. Must be called when the
    /// host's placement record changes mid-session.
    pub fn invalidate_host(&mut self, hostname: &str) {
        self.provider_ids.invalidate(hostname);
        self.host_traits.invalidate(hostname);
    }

    /// Resource-provider id of a host, fetched at most once per session.
    pub fn provider_id(&mut self, hostname: &str) -> Lookup<Uuid> {
        if let Some(uuid) = self.provider_ids.get(hostname) {
            return Lookup::Found(*uuid);
        }

        match self.placement.find_provider(hostname) {
            Ok(Some(provider)) => {
                self.provider_ids.insert(hostname.to_string(), provider.uuid);
                Lookup::Found(provider.uuid)
            }
            Ok(None) => {
                warn!(hostname, "no resource provider registered for host");
                Lookup::Absent
            }
            Err(err) => {
                warn!(hostname, error = %err, "resource provider lookup failed");
                Lookup::Unavailable(format!("provider lookup for {hostname}: {err}"))
            }
        }
    }

    /// Traits advertised by a host. A host without a provider record is
    /// `Absent`; an unreachable placement service is `Unavailable`, which
    /// is deliberately not collapsed into an empty set.
    pub fn host_traits(&mut self, hostname: &str) -> Lookup<HashSet<String>> {
        if let Some(traits) = self.host_traits.get(hostname) {
            return Lookup::Found(traits.clone());
        }

        let provider = match self.provider_id(hostname) {
            Lookup::Found(uuid) => uuid,
            Lookup::Absent => return Lookup::Absent,
            Lookup::Unavailable(reason) => return Lookup::Unavailable(reason),
        };

        match self.placement.list_traits(&provider) {
            Ok(listing) => {
                let traits: HashSet<String> = listing.traits.into_iter().collect();
                debug!(hostname, traits = traits.len(), "cached host traits");
                self.host_traits.insert(hostname.to_string(), traits.clone());
                Lookup::Found(traits)
            }
            Err(err) => {
                warn!(hostname, error = %err, "trait listing failed");
                Lookup::Unavailable(format!("trait listing for {hostname}: {err}"))
            }
        }
    }

    /// Capability names the workload insists on: HCI hints from its detail
    /// record plus flavor extra specs of the form `trait:NAME=required`.
    ///
    /// A workload without a detail record cannot carry HCI hints, but its
    /// flavor may still require traits, so the flavor is consulted either
    /// way through the externally supplied cache.
    pub fn required_traits(&mut self, vm: &VmInstance) -> Lookup<HashSet<String>> {
        let detail = match self.compute.server_detail(&vm.id) {
            Ok(detail) => detail,
            Err(err) => {
                warn!(vm = %vm.id, error = %err, "server detail fetch failed");
                return Lookup::Unavailable(format!("server detail for {}: {err}", vm.id));
            }
        };

        let mut required = HashSet::new();
        let flavor_key = match &detail {
            Some(detail) => {
                if let Some(hci) = &detail.hci_info {
                    required.extend(hci.required_traits.iter().cloned());
                }
                detail.flavor.id.as_str()
            }
            None => vm.flavor_id.as_str(),
        };

        if let Some(flavor) = self.flavors.get(flavor_key) {
            required.extend(flavor.required_traits().map(str::to_string));
        }

        Lookup::Found(required)
    }

    /// True when the target advertises every trait the workload requires.
    /// A workload with no requirements is compatible with any host.
    pub fn compatibility(&mut self, vm: &VmInstance, target_host: &str) -> Lookup<bool> {
        let required = match self.required_traits(vm) {
            Lookup::Found(required) => required,
            Lookup::Absent => return Lookup::Found(true),
            Lookup::Unavailable(reason) => return Lookup::Unavailable(reason),
        };
        if required.is_empty() {
            return Lookup::Found(true);
        }

        let advertised = match self.host_traits(target_host) {
            Lookup::Found(advertised) => advertised,
            Lookup::Absent => HashSet::new(),
            Lookup::Unavailable(reason) => return Lookup::Unavailable(reason),
        };

        let missing: Vec<&String> = required.difference(&advertised).collect();
        if !missing.is_empty() {
            debug!(vm = %vm.id, target_host, ?missing, "target is missing required traits");
            return Lookup::Found(false);
        }
        Lookup::Found(true)
    }
}
