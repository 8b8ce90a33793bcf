use tracing::debug;

use crate::core::node::SimulatedNodeState;
use crate::core::vm::Flavor;

/// Decides whether moving `flavor`-sized demand from `source` to `target`
/// strictly reduces the pressure gap between the two hosts.
///
/// A host with a zero total in either dimension cannot express a
/// meaningful utilization ratio, so any move touching one is rejected.
/// A tie is rejected as well: accepting zero-gain moves would let the
/// planner shuttle the same workload back and forth within one session.
pub fn would_improve_balance(
    source: &SimulatedNodeState,
    target: &SimulatedNodeState,
    flavor: &Flavor,
) -> bool {
    if source.vcpus_total == 0
        || source.memory_mb_total == 0
        || target.vcpus_total == 0
        || target.memory_mb_total == 0
    {
        return false;
    }

    let current_gap = (source.pressure() - target.pressure()).abs();

    let vcpus = flavor.vcpus as i64;
    let ram = flavor.ram as i64;
    let new_gap = (source.pressure_after(-vcpus, -ram) - target.pressure_after(vcpus, ram)).abs();

    debug!(current_gap, new_gap, "evaluated balance impact");
    current_gap - new_gap > 0.0
}
