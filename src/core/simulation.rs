use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::balance;
use crate::core::errors::{ResourceKind, SimulationError};
use crate::core::node::{AllocationRatios, HypervisorRecord, SimulatedNodeState};
use crate::core::vm::{Flavor, VmInstance};

/// Cluster-wide pressure statistics over the simulated nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClusterMetrics {
    pub avg_utilization: f64,
    pub min_utilization: f64,
    pub max_utilization: f64,
}

/// One per-host line of the utilization report.
#[derive(Debug, Clone, Serialize)]
pub struct NodeUtilization {
    pub hostname: String,
    pub vcpus_used: u32,
    pub vcpus_total: u32,
    pub cpu_percent: f64,
    pub memory_mb_used: u64,
    pub memory_mb_total: u64,
    pub memory_percent: f64,
    pub running_vms: u32,
    pub pending_in: usize,
    pub pending_out: usize,
}

/// In-memory projection of cluster state for one planning session.
///
/// The simulation is owned exclusively by the session. Rebuilding is a
/// full reset, and `clone` is the snapshot mechanism for speculative
/// batches of registrations: a registered migration has no inverse, so a
/// caller that wants to discard a batch restores the clone wholesale.
#[derive(Debug, Clone)]
pub struct ClusterSimulation {
    nodes: HashMap<String, SimulatedNodeState>,
    ratios: AllocationRatios,
    built_at: DateTime<Utc>,
}

impl ClusterSimulation {
    pub fn from_inventory(records: &[HypervisorRecord], ratios: AllocationRatios) -> Self {
        let mut simulation = Self {
            nodes: HashMap::new(),
            ratios,
            built_at: Utc::now(),
        };
        simulation.rebuild(records);
        simulation
    }

    /// Full reset from a fresh inventory snapshot. Every previously
    /// registered simulated migration is discarded.
    pub fn rebuild(&mut self, records: &[HypervisorRecord]) {
        self.nodes.clear();
        for record in records {
            self.nodes.insert(
                record.hypervisor_hostname.clone(),
                SimulatedNodeState::from_record(record, self.ratios),
            );
        }
        self.built_at = Utc::now();
        info!(nodes = self.nodes.len(), "initialized cluster simulation");
    }

    pub fn node(&self, hostname: &str) -> Option<&SimulatedNodeState> {
        self.nodes.get(hostname)
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.nodes.contains_key(hostname)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SimulatedNodeState)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ratios(&self) -> AllocationRatios {
        self.ratios
    }

    /// When the inventory snapshot behind this simulation was taken.
    /// Session caches must be invalidated if the cluster changes after
    /// this point.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    fn workload_already_planned(&self, vm_id: &str) -> bool {
        self.nodes.values().any(|node| {
            node.planned_migrations_in.contains(vm_id)
                || node.planned_migrations_out.contains(vm_id)
        })
    }

    /// Whether moving the workload's flavor demand from `source` to
    /// `target` strictly reduces the pressure gap between them. Hosts
    /// missing from the simulation reject the move.
    pub fn would_improve_balance(&self, source: &str, target: &str, flavor: &Flavor) -> bool {
        match (self.nodes.get(source), self.nodes.get(target)) {
            (Some(source_state), Some(target_state)) => {
                balance::would_improve_balance(source_state, target_state, flavor)
            }
            _ => false,
        }
    }

    /// Commit an accepted move into the ledger: source and target mutate
    /// together. A failure here is a consistency error on the caller's
    /// side, never an infeasibility verdict, and nothing is mutated when
    /// one is returned.
    ///
    /// A workload id may take part in at most one planned migration per
    /// session; a second registration is rejected.
    pub fn register_migration(
        &mut self,
        vm: &VmInstance,
        source: &str,
        target: &str,
        flavor: &Flavor,
    ) -> Result<(), SimulationError> {
        if !self.nodes.contains_key(target) {
            return Err(SimulationError::UnknownHost {
                hostname: target.to_string(),
            });
        }
        let Some(source_state) = self.nodes.get(source) else {
            return Err(SimulationError::UnknownHost {
                hostname: source.to_string(),
            });
        };
        if self.workload_already_planned(&vm.id) {
            return Err(SimulationError::AlreadyPlanned { vm_id: vm.id.clone() });
        }
        if source_state.vcpus_used < flavor.vcpus {
            return Err(SimulationError::UsageUnderflow {
                hostname: source.to_string(),
                resource: ResourceKind::Vcpus,
            });
        }
        if source_state.memory_mb_used < flavor.ram {
            return Err(SimulationError::UsageUnderflow {
                hostname: source.to_string(),
                resource: ResourceKind::Memory,
            });
        }

        if let Some(state) = self.nodes.get_mut(source) {
            state.vcpus_used -= flavor.vcpus;
            state.memory_mb_used -= flavor.ram;
            state.running_vms = state.running_vms.saturating_sub(1);
            state.planned_migrations_out.insert(vm.id.clone());
        }
        if let Some(state) = self.nodes.get_mut(target) {
            state.vcpus_used += flavor.vcpus;
            state.memory_mb_used += flavor.ram;
            state.running_vms += 1;
            state.planned_migrations_in.insert(vm.id.clone());
        }

        debug!(
            vm = %vm.id,
            source,
            target_host = target,
            vcpus = flavor.vcpus,
            ram_mb = flavor.ram,
            "registered simulated migration"
        );
        Ok(())
    }

    /// Average, minimum and maximum pressure across the simulation.
    /// An empty simulation reports zeros.
    pub fn cluster_metrics(&self) -> ClusterMetrics {
        if self.nodes.is_empty() {
            return ClusterMetrics::default();
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for node in self.nodes.values() {
            let pressure = node.pressure();
            sum += pressure;
            min = min.min(pressure);
            max = max.max(pressure);
        }

        ClusterMetrics {
            avg_utilization: sum / self.nodes.len() as f64,
            min_utilization: min,
            max_utilization: max,
        }
    }

    /// Structured read-only view of the current simulated utilization,
    /// sorted by hostname for stable output.
    pub fn utilization_report(&self) -> Vec<NodeUtilization> {
        let mut report: Vec<NodeUtilization> = self
            .nodes
            .iter()
            .map(|(hostname, node)| NodeUtilization {
                hostname: hostname.clone(),
                vcpus_used: node.vcpus_used,
                vcpus_total: node.vcpus_total,
                cpu_percent: node.cpu_ratio() * 100.0,
                memory_mb_used: node.memory_mb_used,
                memory_mb_total: node.memory_mb_total,
                memory_percent: node.memory_ratio() * 100.0,
                running_vms: node.running_vms,
                pending_in: node.planned_migrations_in.len(),
                pending_out: node.planned_migrations_out.len(),
            })
            .collect();
        report.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        report
    }

    /// Human-readable rendering of the utilization report. Pure read, no
    /// external calls.
    pub fn summary(&self) -> String {
        let metrics = self.cluster_metrics();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "cluster utilization: {:.1}% (min: {:.1}%, max: {:.1}%)",
            metrics.avg_utilization * 100.0,
            metrics.min_utilization * 100.0,
            metrics.max_utilization * 100.0,
        );
        for line in self.utilization_report() {
            let _ = writeln!(out, "node {}:", line.hostname);
            let _ = writeln!(
                out,
                "  cpus: {}/{} ({:.1}%)",
                line.vcpus_used, line.vcpus_total, line.cpu_percent
            );
            let _ = writeln!(
                out,
                "  memory: {}/{}MB ({:.1}%)",
                line.memory_mb_used, line.memory_mb_total, line.memory_percent
            );
            let _ = writeln!(
                out,
                "  running vms: {}, migrations in: {}, out: {}",
                line.running_vms, line.pending_in, line.pending_out
            );
        }
        out
    }
}
