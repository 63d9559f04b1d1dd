//! Network topology: the ordered network groups of a cluster.
//!
//! Order is admin first, then public (when the cluster has one), then every
//! remaining group in configured order. The engine relies on this order for
//! deterministic tie-breaking, so it only depends on the groups themselves.

use std::collections::HashSet;

use ipnet::IpNet;
use netbind_core::{ClusterConfig, NetworkRole};
use netbind_state::NetworkGroup;

use crate::error::{PlacementError, PlacementResult};

/// Validated, ordered network groups of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTopology {
    cluster_id: String,
    groups: Vec<NetworkGroup>,
    has_public: bool,
}

impl NetworkTopology {
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Groups in placement order. Never empty: index 0 is the admin group.
    pub fn groups(&self) -> &[NetworkGroup] {
        &self.groups
    }

    pub fn admin(&self) -> &NetworkGroup {
        &self.groups[0]
    }

    /// CIDR used to elect the admin interface.
    pub fn admin_cidr(&self) -> IpNet {
        // Presence checked in `groups_for`.
        self.admin().cidr.unwrap_or_else(netbind_core::default_admin_cidr)
    }

    pub fn public(&self) -> Option<&NetworkGroup> {
        self.has_public.then(|| &self.groups[1])
    }

    /// Groups that are neither admin nor public.
    pub fn remaining(&self) -> &[NetworkGroup] {
        let skip = if self.has_public { 2 } else { 1 };
        &self.groups[skip..]
    }

    pub fn find(&self, name: &str) -> Option<&NetworkGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}

/// Order a cluster's network groups for placement.
///
/// Fails when the cluster has no admin group, more than one, an admin group
/// without a CIDR, or more than one public group.
pub fn groups_for(cluster_id: &str, groups: Vec<NetworkGroup>) -> PlacementResult<NetworkTopology> {
    let (mut admins, rest): (Vec<_>, Vec<_>) = groups.into_iter().partition(NetworkGroup::is_admin);
    let (mut publics, mut others): (Vec<_>, Vec<_>) = rest.into_iter().partition(NetworkGroup::is_public);

    let admin = match admins.len() {
        0 => {
            return Err(PlacementError::Configuration(format!(
                "cluster {cluster_id} has no admin network"
            )));
        }
        1 => admins.remove(0),
        n => {
            return Err(PlacementError::Configuration(format!(
                "cluster {cluster_id} has {n} admin networks, expected exactly one"
            )));
        }
    };
    if admin.cidr.is_none() {
        return Err(PlacementError::Configuration(format!(
            "admin network {} of cluster {cluster_id} has no CIDR",
            admin.name
        )));
    }
    if publics.len() > 1 {
        return Err(PlacementError::Configuration(format!(
            "cluster {cluster_id} has {} public networks, expected at most one",
            publics.len()
        )));
    }

    others.sort_by_key(|g| g.position);
    let has_public = !publics.is_empty();

    let mut ordered = Vec::with_capacity(others.len() + 2);
    ordered.push(admin);
    ordered.append(&mut publics);
    ordered.append(&mut others);

    Ok(NetworkTopology {
        cluster_id: cluster_id.to_string(),
        groups: ordered,
        has_public,
    })
}

/// Build the network group records of a cluster from its configuration.
///
/// Also validates the cluster's overrides: each must name an existing,
/// non-admin network.
pub fn materialize(config: &ClusterConfig) -> PlacementResult<Vec<NetworkGroup>> {
    if config.id.is_empty() || config.id.contains(['/', ':']) {
        return Err(PlacementError::Configuration(format!(
            "invalid cluster id '{}'",
            config.id
        )));
    }

    let mut seen = HashSet::new();
    let mut groups = Vec::new();
    for (position, def) in config.network_defs().into_iter().enumerate() {
        if def.name.is_empty() {
            return Err(PlacementError::Configuration(format!(
                "cluster {} has a network without a name",
                config.id
            )));
        }
        if !seen.insert(def.name.clone()) {
            return Err(PlacementError::Configuration(format!(
                "cluster {} defines network {} twice",
                config.id, def.name
            )));
        }
        groups.push(NetworkGroup {
            id: NetworkGroup::group_id(&config.id, &def.name),
            cluster_id: config.id.clone(),
            name: def.name,
            cidr: if def.role == NetworkRole::Admin { def.cidr } else { None },
            role: def.role,
            position: position as u32,
        });
    }

    // Run the ordering checks before anything is persisted.
    let topology = groups_for(&config.id, groups.clone())?;

    for (network, interface) in &config.overrides {
        match topology.find(network) {
            None => {
                return Err(PlacementError::Configuration(format!(
                    "override for unknown network {network} (interface {interface})"
                )));
            }
            Some(group) if group.is_admin() => {
                return Err(PlacementError::Configuration(format!(
                    "admin network {network} is elected and cannot be overridden"
                )));
            }
            Some(_) => {}
        }
    }

    Ok(groups)
}
