pub mod config;
pub mod core;
pub mod placement;

// Re-exports
pub use crate::config::{PlannerSettings, Settings};
pub use crate::core::errors::{PlannerError, PlannerResult, SimulationError};
pub use crate::core::node::{AllocationRatios, HypervisorRecord, SimulatedNodeState};
pub use crate::core::planner::{MigrationDecision, MigrationPlanner};
pub use crate::core::simulation::{ClusterMetrics, ClusterSimulation, NodeUtilization};
pub use crate::core::vm::{Flavor, FlavorCache, VmInstance};
pub use crate::placement::{
    ClientError, ComputeClient, Lookup, PlacementClient, ResourceProvider, SessionCache,
    TraitListing, TraitResolver,
};
