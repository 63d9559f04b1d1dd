//! netbind placement: maps a cluster's logical networks onto a node's
//! physical interfaces.
//!
//! Everything in this crate is a pure function of its arguments: it never
//! touches the state store. `netbind-cluster` decides *when* placement runs
//! and persists the results.
//!
//! # Components
//!
//! - **`catalog`**: Validates raw interface meta and diffs it against prior state
//! - **`topology`**: Ordered network groups of a cluster (admin, public, rest)
//! - **`engine`**: Allowed sets, admin election, default assignment
//! - **`convert`**: Type conversions from and to state store records

pub mod catalog;
pub mod convert;
pub mod engine;
pub mod error;
pub mod topology;

pub use catalog::{
    Interface, InterfaceDiff, RawInterface, RawMeta, RetainedInterface, diff, normalize,
    normalize_mac,
};
pub use convert::{
    allowed_records, assignment_from_records, assignment_records, interface_record,
    interfaces_from_records,
};
pub use engine::{
    AdminElection, AllowedSet, Assignment, ElectionBasis, compute_allowed, compute_assignment,
    elect_admin, reelect, verify,
};
pub use error::{PlacementError, PlacementResult};
pub use topology::{NetworkTopology, groups_for, materialize};
