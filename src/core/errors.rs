use std::fmt;

use thiserror::Error;

use crate::placement::ClientError;

/// Top-level error type for the planning crate.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Lookup error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Consistency errors raised when mutating the simulated ledger. These
/// indicate a caller or programming error, not an infeasible plan, and are
/// therefore surfaced loudly instead of as a rejection reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("host not present in simulation: {hostname}")]
    UnknownHost { hostname: String },

    #[error("workload {vm_id} is already part of a planned migration")]
    AlreadyPlanned { vm_id: String },

    #[error("registering the migration would drive {resource} usage on {hostname} below zero")]
    UsageUnderflow {
        hostname: String,
        resource: ResourceKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Vcpus,
    Memory,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Vcpus => write!(f, "vCPU"),
            ResourceKind::Memory => write!(f, "memory"),
        }
    }
}

// Result type alias for convenience
pub type PlannerResult<T> = Result<T, PlannerError>;
