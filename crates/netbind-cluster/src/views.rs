//! Read-side views over a consistent snapshot.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use netbind_placement::{
    AdminElection, AllowedSet, Assignment, Interface, compute_allowed, compute_assignment,
    elect_admin, groups_for, interfaces_from_records,
};
use netbind_state::{GroupId, NetworkGroup, NodeRecord, StateSnapshot};
use serde::Serialize;

use crate::error::{LifecycleError, LifecycleResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkRef {
    pub id: GroupId,
    pub name: String,
}

/// One interface with the networks it carries and may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicView {
    pub name: String,
    pub mac: String,
    pub ip: Option<IpAddr>,
    pub assigned_networks: Vec<NetworkRef>,
    pub allowed_networks: Vec<NetworkRef>,
}

/// Stored placement of a node's interfaces.
pub fn node_nics(snapshot: &StateSnapshot, node_id: &str) -> LifecycleResult<Vec<NicView>> {
    let node = load_node(snapshot, node_id)?;
    let interfaces = interfaces_from_records(&snapshot.list_interfaces(node_id)?);
    let groups = ordered_groups(snapshot, &node)?;

    let allowed: AllowedSet = snapshot
        .list_allowed(node_id)?
        .into_iter()
        .map(|r| (r.mac, r.groups.into_iter().collect()))
        .collect();
    let assignment: Assignment = snapshot
        .list_assignments(node_id)?
        .into_iter()
        .map(|r| (r.group_id, r.mac))
        .collect();

    Ok(render(&interfaces, &groups, &allowed, &assignment))
}

/// The default placement the node would get now, computed without storing it.
///
/// A detached node has no networks to place, so every interface comes back
/// with empty sets.
pub fn default_nics(snapshot: &StateSnapshot, node_id: &str) -> LifecycleResult<Vec<NicView>> {
    let node = load_node(snapshot, node_id)?;
    let interfaces = interfaces_from_records(&snapshot.list_interfaces(node_id)?);

    let Some(cluster_id) = node.cluster_id.as_deref() else {
        return Ok(render(&interfaces, &[], &AllowedSet::new(), &Assignment::default()));
    };
    let cluster = snapshot
        .get_cluster(cluster_id)?
        .ok_or_else(|| LifecycleError::ClusterNotFound(cluster_id.to_string()))?;
    let topology = groups_for(cluster_id, snapshot.list_groups(cluster_id)?)?;

    let allowed = compute_allowed(&interfaces, &topology);
    let assignment =
        compute_assignment(&interfaces, &topology, &node.primary_mac, &cluster.overrides)?;
    Ok(render(&interfaces, topology.groups(), &allowed, &assignment))
}

/// Last-known interfaces of a node, ordered by name.
pub fn raw_interfaces(snapshot: &StateSnapshot, node_id: &str) -> LifecycleResult<Vec<Interface>> {
    load_node(snapshot, node_id)?;
    Ok(interfaces_from_records(&snapshot.list_interfaces(node_id)?))
}

/// The interface that would carry the admin network right now.
///
/// Attached nodes use their cluster's admin CIDR, detached nodes
/// `default_cidr`.
pub fn admin_interface(
    snapshot: &StateSnapshot,
    node_id: &str,
    default_cidr: &IpNet,
) -> LifecycleResult<AdminElection> {
    let node = load_node(snapshot, node_id)?;
    let interfaces = interfaces_from_records(&snapshot.list_interfaces(node_id)?);

    let cidr = match node.cluster_id.as_deref() {
        Some(cluster_id) => groups_for(cluster_id, snapshot.list_groups(cluster_id)?)?.admin_cidr(),
        None => *default_cidr,
    };
    Ok(elect_admin(&interfaces, &cidr, &node.primary_mac)?)
}

fn load_node(snapshot: &StateSnapshot, node_id: &str) -> LifecycleResult<NodeRecord> {
    snapshot
        .get_node(node_id)?
        .ok_or_else(|| LifecycleError::NodeNotFound(node_id.to_string()))
}

fn ordered_groups(snapshot: &StateSnapshot, node: &NodeRecord) -> LifecycleResult<Vec<NetworkGroup>> {
    match node.cluster_id.as_deref() {
        Some(cluster_id) => {
            let topology = groups_for(cluster_id, snapshot.list_groups(cluster_id)?)?;
            Ok(topology.groups().to_vec())
        }
        None => Ok(Vec::new()),
    }
}

fn render(
    interfaces: &[Interface],
    groups: &[NetworkGroup],
    allowed: &AllowedSet,
    assignment: &Assignment,
) -> Vec<NicView> {
    let names: BTreeMap<&str, &str> = groups
        .iter()
        .map(|g| (g.id.as_str(), g.name.as_str()))
        .collect();
    let reference = |id: &str| NetworkRef {
        id: id.to_string(),
        name: names
            .get(id)
            .copied()
            .unwrap_or_else(|| id.rsplit('/').next().unwrap_or(id))
            .to_string(),
    };

    interfaces
        .iter()
        .map(|interface| {
            let permitted = allowed.get(&interface.mac);
            NicView {
                name: interface.name.clone(),
                mac: interface.mac.clone(),
                ip: interface.ip,
                assigned_networks: groups
                    .iter()
                    .filter(|g| assignment.get(&g.id) == Some(interface.mac.as_str()))
                    .map(|g| reference(&g.id))
                    .collect(),
                allowed_networks: groups
                    .iter()
                    .filter(|g| permitted.is_some_and(|set| set.contains(&g.id)))
                    .map(|g| reference(&g.id))
                    .collect(),
            }
        })
        .collect()
}
