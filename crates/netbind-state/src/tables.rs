//! redb table definitions for the netbind state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).
//! Node-scoped keys are `{node_id}:{child}`, cluster-scoped keys are
//! `{cluster_id}/{child}`.

use redb::TableDefinition;

/// Cluster records keyed by `{cluster_id}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Network groups keyed by `{cluster_id}/{name}` (the group id).
pub const NETWORK_GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("network_groups");

/// Node records keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Discovered interfaces keyed by `{node_id}:{mac}`.
pub const INTERFACES: TableDefinition<&str, &[u8]> = TableDefinition::new("interfaces");

/// Allowed networks keyed by `{node_id}:{mac}`.
pub const ALLOWED_NETWORKS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("allowed_networks");

/// Network assignments keyed by `{node_id}:{group_id}`.
pub const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");
