use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Multipliers applied to physical capacity to permit overcommitment,
/// e.g. 8 virtual CPUs scheduled per physical CPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationRatios {
    pub cpu: f64,
    pub ram: f64,
}

impl Default for AllocationRatios {
    fn default() -> Self {
        Self { cpu: 8.0, ram: 1.5 }
    }
}

/// One entry of the hypervisor inventory snapshot as reported by the
/// control plane. Some hypervisor drivers omit counters entirely, so
/// every counter defaults to zero on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorRecord {
    pub hypervisor_hostname: String,
    #[serde(default)]
    pub vcpus: u32,
    #[serde(default)]
    pub vcpus_used: u32,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub memory_mb_used: u64,
    #[serde(default)]
    pub running_vms: u32,
    #[serde(default = "unknown")]
    pub state: String,
    #[serde(default = "unknown")]
    pub status: String,
}

fn unknown() -> String {
    "unknown".to_string()
}

/// Per-host resource ledger tracked while planning migrations.
///
/// The counters mirror the inventory snapshot the simulation was built
/// from; the `planned_migrations_*` sets accumulate the workload ids of
/// moves registered during the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedNodeState {
    pub vcpus_total: u32,
    pub vcpus_used: u32,
    pub memory_mb_total: u64,
    pub memory_mb_used: u64,
    pub running_vms: u32,
    pub planned_migrations_in: HashSet<String>,
    pub planned_migrations_out: HashSet<String>,
    ratios: AllocationRatios,
}

impl SimulatedNodeState {
    pub fn from_record(record: &HypervisorRecord, ratios: AllocationRatios) -> Self {
        Self {
            vcpus_total: record.vcpus,
            vcpus_used: record.vcpus_used,
            memory_mb_total: record.memory_mb,
            memory_mb_used: record.memory_mb_used,
            running_vms: record.running_vms,
            planned_migrations_in: HashSet::new(),
            planned_migrations_out: HashSet::new(),
            ratios,
        }
    }

    pub fn ratios(&self) -> AllocationRatios {
        self.ratios
    }

    /// Schedulable CPU headroom after overcommit. Negative when the node
    /// is already past its allocation ratio.
    pub fn available_vcpus(&self) -> f64 {
        self.vcpus_total as f64 * self.ratios.cpu - self.vcpus_used as f64
    }

    pub fn available_memory(&self) -> f64 {
        self.memory_mb_total as f64 * self.ratios.ram - self.memory_mb_used as f64
    }

    /// CPU utilization against the overcommitted capacity. A node that
    /// reports no CPU capacity at all counts as fully saturated.
    pub fn cpu_ratio(&self) -> f64 {
        if self.vcpus_total == 0 {
            return 1.0;
        }
        self.vcpus_used as f64 / (self.vcpus_total as f64 * self.ratios.cpu)
    }

    pub fn memory_ratio(&self) -> f64 {
        if self.memory_mb_total == 0 {
            return 1.0;
        }
        self.memory_mb_used as f64 / (self.memory_mb_total as f64 * self.ratios.ram)
    }

    /// Bottleneck utilization: whichever dimension is under more pressure.
    pub fn pressure(&self) -> f64 {
        self.cpu_ratio().max(self.memory_ratio())
    }

    /// Pressure after adjusting the used counters by the given deltas,
    /// keeping the same allocation-ratio-adjusted denominators. Zero
    /// totals saturate to 1.0 like the plain ratios.
    pub fn pressure_after(&self, vcpus_delta: i64, memory_mb_delta: i64) -> f64 {
        let cpu = if self.vcpus_total == 0 {
            1.0
        } else {
            (self.vcpus_used as f64 + vcpus_delta as f64)
                / (self.vcpus_total as f64 * self.ratios.cpu)
        };
        let memory = if self.memory_mb_total == 0 {
            1.0
        } else {
            (self.memory_mb_used as f64 + memory_mb_delta as f64)
                / (self.memory_mb_total as f64 * self.ratios.ram)
        };
        cpu.max(memory)
    }
}
