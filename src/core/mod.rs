pub mod balance;
pub mod errors;
pub mod node;
pub mod planner;
pub mod simulation;
pub mod vm;

// Re-exports
pub use errors::{PlannerError, PlannerResult, ResourceKind, SimulationError};
pub use node::{AllocationRatios, HypervisorRecord, SimulatedNodeState};
pub use planner::{MigrationDecision, MigrationPlanner};
pub use simulation::{ClusterMetrics, ClusterSimulation, NodeUtilization};
pub use vm::{Flavor, FlavorCache, HciInfo, ServerDetail, VmInstance};
