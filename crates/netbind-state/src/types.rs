//! Record types for the netbind state store.
//!
//! These types are the persisted form of clusters, network groups, nodes,
//! interfaces and the placement relations. All are serializable to/from
//! JSON for storage in redb tables.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use netbind_core::{NetworkRole, SegmentationPolicy};
use serde::{Deserialize, Serialize};

/// Unique identifier for a node.
pub type NodeId = String;

/// Unique identifier for a cluster.
pub type ClusterId = String;

/// Unique identifier for a network group: `{cluster_id}/{name}`.
pub type GroupId = String;

/// Hardware (MAC) address, the stable identity of an interface.
pub type HardwareAddress = String;

// ── Cluster ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub segmentation: SegmentationPolicy,
    /// Network name → interface name placement overrides.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
    /// Unix timestamp (seconds) when this cluster was created.
    pub created_at: u64,
}

/// A logical network of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkGroup {
    pub id: GroupId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub role: NetworkRole,
    /// Only set (and only consulted) on the admin group.
    pub cidr: Option<IpNet>,
    /// Position in the cluster's configured network order.
    pub position: u32,
}

impl NetworkGroup {
    pub fn group_id(cluster_id: &str, name: &str) -> GroupId {
        format!("{cluster_id}/{name}")
    }

    pub fn is_admin(&self) -> bool {
        self.role == NetworkRole::Admin
    }

    pub fn is_public(&self) -> bool {
        self.role == NetworkRole::Public
    }
}

// ── Node ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Hardware address the node registered with.
    pub primary_mac: HardwareAddress,
    pub cluster_id: Option<ClusterId>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Last-known state of one discovered interface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub node_id: NodeId,
    pub name: String,
    pub mac: HardwareAddress,
    pub ip: Option<IpAddr>,
}

impl InterfaceRecord {
    /// Build the composite key for the interfaces table.
    pub fn table_key(&self) -> String {
        interface_key(&self.node_id, &self.mac)
    }
}

// ── Placement ─────────────────────────────────────────────────────

/// Networks an interface may carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowedNetworks {
    pub node_id: NodeId,
    pub mac: HardwareAddress,
    pub groups: Vec<GroupId>,
}

impl AllowedNetworks {
    /// Build the composite key for the allowed networks table.
    pub fn table_key(&self) -> String {
        interface_key(&self.node_id, &self.mac)
    }
}

/// The interface currently carrying a network on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkAssignment {
    pub node_id: NodeId,
    pub group_id: GroupId,
    pub mac: HardwareAddress,
}

impl NetworkAssignment {
    /// Build the composite key for the assignments table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.node_id, self.group_id)
    }
}

pub(crate) fn interface_key(node_id: &str, mac: &str) -> String {
    format!("{node_id}:{mac}")
}

pub(crate) fn node_prefix(node_id: &str) -> String {
    format!("{node_id}:")
}

pub(crate) fn cluster_prefix(cluster_id: &str) -> String {
    format!("{cluster_id}/")
}
