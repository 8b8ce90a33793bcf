use tracing::{debug, info};

use crate::core::errors::SimulationError;
use crate::core::simulation::ClusterSimulation;
use crate::core::vm::{Flavor, FlavorCache, VmInstance};
use crate::placement::{ComputeClient, Lookup, PlacementClient, TraitResolver};

/// Outcome of a feasibility evaluation: either the move is worth
/// registering, or the first failing gate's diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationDecision {
    Accepted,
    Rejected { reason: String },
}

impl MigrationDecision {
    pub fn accepted(&self) -> bool {
        matches!(self, MigrationDecision::Accepted)
    }

    pub fn reason(&self) -> &str {
        match self {
            MigrationDecision::Accepted => "OK",
            MigrationDecision::Rejected { reason } => reason,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        MigrationDecision::Rejected {
            reason: reason.into(),
        }
    }
}

/// Evaluates candidate migrations against the simulated cluster and
/// commits the accepted ones.
///
/// One planner per planning session: the simulation ledger and the
/// resolver caches live and die with it. Candidates are evaluated one at
/// a time, so a registered move is visible to every later evaluation and
/// freed capacity is never double-allocated.
pub struct MigrationPlanner<'a, P, C> {
    simulation: ClusterSimulation,
    resolver: TraitResolver<'a, P, C>,
}

impl<'a, P: PlacementClient, C: ComputeClient> MigrationPlanner<'a, P, C> {
    pub fn new(
        simulation: ClusterSimulation,
        placement: &'a P,
        compute: &'a C,
        flavors: &'a FlavorCache,
    ) -> Self {
        Self {
            simulation,
            resolver: TraitResolver::new(placement, compute, flavors),
        }
    }

    pub fn simulation(&self) -> &ClusterSimulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut ClusterSimulation {
        &mut self.simulation
    }

    pub fn resolver_mut(&mut self) -> &mut TraitResolver<'a, P, C> {
        &mut self.resolver
    }

    /// Replace the working simulation, e.g. to discard a speculative batch
    /// of registrations by restoring a snapshot taken with `clone`.
    pub fn restore(&mut self, snapshot: ClusterSimulation) {
        self.simulation = snapshot;
    }

    /// Ordered feasibility gates, short-circuiting on the first failure so
    /// the surfaced reason names the cheapest violated constraint:
    /// target known, not already planned, capacity, traits, balance.
    pub fn can_migrate(
        &mut self,
        vm: &VmInstance,
        target_host: &str,
        flavor: &Flavor,
    ) -> MigrationDecision {
        let Some(target) = self.simulation.node(target_host) else {
            return MigrationDecision::rejected(format!(
                "target host {target_host} is not part of the simulation"
            ));
        };

        if target.planned_migrations_in.contains(&vm.id) {
            return MigrationDecision::rejected(format!(
                "{} is already planned to migrate to {target_host}",
                vm.name
            ));
        }

        if target.available_vcpus() < flavor.vcpus as f64 {
            return MigrationDecision::rejected(format!(
                "insufficient vcpus on {target_host}: available {:.1}, required {}",
                target.available_vcpus(),
                flavor.vcpus
            ));
        }
        if target.available_memory() < flavor.ram as f64 {
            return MigrationDecision::rejected(format!(
                "insufficient memory on {target_host}: available {:.0}MB, required {}MB",
                target.available_memory(),
                flavor.ram
            ));
        }

        match self.resolver.compatibility(vm, target_host) {
            Lookup::Found(true) => {}
            Lookup::Found(false) | Lookup::Absent => {
                return MigrationDecision::rejected(format!(
                    "{target_host} lacks traits required by {}",
                    vm.name
                ));
            }
            Lookup::Unavailable(reason) => {
                // An unreachable trait service is not evidence of
                // compatibility; refuse instead of guessing.
                return MigrationDecision::rejected(format!(
                    "trait information unavailable, refusing to plan: {reason}"
                ));
            }
        }

        if !self
            .simulation
            .would_improve_balance(&vm.host, target_host, flavor)
        {
            return MigrationDecision::rejected(format!(
                "moving {} from {} to {target_host} would not improve balance",
                vm.name, vm.host
            ));
        }

        MigrationDecision::Accepted
    }

    /// Commit an accepted move into the simulated ledger. Callers are
    /// expected to have passed `can_migrate` first; a failure here
    /// indicates an inconsistent plan, not an infeasible one.
    pub fn register_migration(
        &mut self,
        vm: &VmInstance,
        source: &str,
        target: &str,
        flavor: &Flavor,
    ) -> Result<(), SimulationError> {
        self.simulation.register_migration(vm, source, target, flavor)?;
        info!(vm = %vm.name, source, target_host = target, "registered planned migration");
        Ok(())
    }

    /// Best migration target for one workload, mirroring how the
    /// evaluation gates see the cluster: only hosts at or below the
    /// target utilization band (`avg * target_factor`) are considered,
    /// every candidate must pass `can_migrate`, and the winner is the
    /// host whose post-move pressure lands closest to the band.
    ///
    /// Which workloads to move, and when, stays with the caller.
    pub fn best_target(
        &mut self,
        vm: &VmInstance,
        flavor: &Flavor,
        target_factor: f64,
    ) -> Option<String> {
        let metrics = self.simulation.cluster_metrics();
        let target_util = metrics.avg_utilization * target_factor;

        let mut candidates: Vec<String> = self
            .simulation
            .iter()
            .filter(|(hostname, node)| {
                hostname.as_str() != vm.host && node.pressure() <= target_util
            })
            .map(|(hostname, _)| hostname.clone())
            .collect();
        candidates.sort();

        let mut best: Option<(String, f64)> = None;
        for hostname in candidates {
            let decision = self.can_migrate(vm, &hostname, flavor);
            if !decision.accepted() {
                debug!(candidate = %hostname, reason = decision.reason(), "candidate target skipped");
                continue;
            }

            let Some(node) = self.simulation.node(&hostname) else {
                continue;
            };
            let post_move = node.pressure_after(flavor.vcpus as i64, flavor.ram as i64);
            let score = (post_move - target_util).abs();
            let better = match &best {
                Some((_, best_score)) => score < *best_score,
                None => true,
            };
            if better {
                best = Some((hostname, score));
            }
        }

        best.map(|(hostname, _)| hostname)
    }
}
