//! netbind-cluster: lifecycle of node interface placement.
//!
//! Keeps each node's allowed networks and network assignment consistent
//! with its cluster membership and its last-reported interfaces.
//!
//! # Architecture
//!
//! ```text
//! LifecycleCoordinator
//!   ├── create_cluster / set_cluster_nodes / delete_cluster
//!   │   └── cluster lock, then member node locks (sorted)
//!   ├── register / attach / detach / update_meta / update_node / reassign
//!   │   └── node lock (cluster lock first when joining)
//!   └── one StateStore write transaction per event
//!       ├── netbind-placement computes allowed sets and assignment
//!       └── commit on success, abort on any error
//!
//! views
//!   └── nics / default_nics / interfaces / admin_interface over a snapshot
//! ```

pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod views;

pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use lifecycle::{
    CascadeReport, LifecycleCoordinator, MembershipReport, Membership, MetaOutcome, NodeUpdate,
};
pub use locks::LockRegistry;
pub use views::{NetworkRef, NicView};
