pub mod cache;
pub mod resolver;

pub use cache::SessionCache;
pub use resolver::TraitResolver;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::vm::ServerDetail;

/// Identity of a host in the external placement inventory. The UUID is
/// distinct from the hostname; trait listings are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraitListing {
    #[serde(default)]
    pub traits: Vec<String>,
}

/// Failure at the transport boundary of an external lookup.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Response(String),
}

/// Placement-service lookups the trait resolver needs. Implementations
/// block; the resolver caches results so each key is fetched at most once
/// per planning session.
pub trait PlacementClient {
    fn find_provider(&self, hostname: &str) -> Result<Option<ResourceProvider>, ClientError>;

    fn list_traits(&self, provider: &Uuid) -> Result<TraitListing, ClientError>;
}

/// Compute-service lookup for per-workload detail records.
pub trait ComputeClient {
    fn server_detail(&self, vm_id: &str) -> Result<Option<ServerDetail>, ClientError>;
}

/// Outcome of an external lookup.
///
/// `Absent` is a definitive empty answer from a reachable dependency;
/// `Unavailable` means the dependency could not be consulted at all.
/// Callers must not treat the two alike: an unreachable trait service is
/// not evidence that a host has no traits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Unavailable(String),
}

impl<T> Lookup<T> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Lookup::Unavailable(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}
