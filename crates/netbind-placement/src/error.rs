//! Error types for placement computations.

use ipnet::IpNet;
use thiserror::Error;

pub type PlacementResult<T> = Result<T, PlacementError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// Malformed or inconsistent interface meta.
    #[error("validation error: {0}")]
    Validation(String),

    /// Cluster network configuration cannot be placed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// More than one interface holds an address inside the admin CIDR.
    #[error("ambiguous admin election: {} all hold addresses inside {cidr}", .candidates.join(", "))]
    AmbiguousAdmin { cidr: IpNet, candidates: Vec<String> },

    /// An operator override points at an interface the node does not have.
    #[error("override for network '{network}' names interface '{interface}' which is not present on the node")]
    UnknownOverride { network: String, interface: String },

    /// A placement targets an interface outside the network's allowed set.
    #[error("network '{group}' is not allowed on interface {mac}")]
    NotAllowed { group: String, mac: String },
}

impl PlacementError {
    pub fn is_validation(&self) -> bool {
        matches!(self, PlacementError::Validation(_) | PlacementError::NotAllowed { .. })
    }

    pub fn is_configuration(&self) -> bool {
        !self.is_validation()
    }
}
