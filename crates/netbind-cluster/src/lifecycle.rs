//! Lifecycle coordinator: keeps interface placement in step with cluster
//! membership and interface meta.
//!
//! Every event runs as one write transaction under the node's lock (and the
//! cluster's lock when membership of that cluster changes). Either all of
//! an event's placement rows are committed or none are.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use ipnet::IpNet;
use netbind_core::ClusterConfig;
use netbind_placement::{
    Assignment, Interface, PlacementError, RawMeta, allowed_records, assignment_from_records,
    assignment_records, compute_allowed, compute_assignment, diff, groups_for,
    interface_record, interfaces_from_records, materialize, normalize, normalize_mac, reelect,
    verify,
};
use netbind_state::{
    AllowedNetworks, ClusterRecord, NodeId, NodeRecord, StateStore, StateTxn,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::locks::LockRegistry;
use crate::views::{self, NicView};

/// What a meta update did to the node's placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaOutcome {
    /// Identical to the stored interfaces; nothing written.
    Unchanged,
    /// Interfaces stored; the node is detached so no placement exists.
    Stored,
    /// Only IPs changed; the admin network followed the admin address.
    Reelected,
    /// Interfaces came, went or were renamed; placement recomputed.
    Recomputed,
}

/// Requested change of cluster membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Membership {
    #[default]
    Keep,
    Join(String),
    Leave,
}

/// A combined node update: meta first, then membership.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub id: NodeId,
    pub meta: Option<RawMeta>,
    pub membership: Membership,
}

/// Nodes whose membership changed in a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipReport {
    pub attached: Vec<NodeId>,
    pub detached: Vec<NodeId>,
}

/// Result of deleting a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub cluster_id: String,
    pub cleared_nodes: Vec<NodeId>,
    pub groups_deleted: u32,
}

/// Applies lifecycle events to the state store.
pub struct LifecycleCoordinator {
    state: StateStore,
    node_locks: LockRegistry,
    cluster_locks: LockRegistry,
    /// Admin CIDR used to describe nodes that belong to no cluster.
    admin_cidr: IpNet,
}

impl LifecycleCoordinator {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            node_locks: LockRegistry::new(),
            cluster_locks: LockRegistry::new(),
            admin_cidr: netbind_core::default_admin_cidr(),
        }
    }

    /// Set the admin CIDR used for detached nodes.
    pub fn with_admin_cidr(mut self, cidr: IpNet) -> Self {
        self.admin_cidr = cidr;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Create a cluster from its configuration and attach `members`.
    pub fn create_cluster(
        &self,
        config: &ClusterConfig,
        members: &[NodeId],
    ) -> LifecycleResult<ClusterRecord> {
        let groups = materialize(config)?;
        let cluster = ClusterRecord {
            id: config.id.clone(),
            name: config.display_name().to_string(),
            segmentation: config.segmentation,
            overrides: config.overrides.clone(),
            created_at: epoch_secs(),
        };
        let member_keys: Vec<&str> = members.iter().map(String::as_str).collect();

        self.cluster_locks.with(&cluster.id, || {
            self.node_locks.with_all(&member_keys, || {
                self.state.transact(|txn| {
                    if txn.get_cluster(&cluster.id)?.is_some() {
                        return Err(LifecycleError::DuplicateCluster(cluster.id.clone()));
                    }
                    txn.put_cluster(&cluster)?;
                    for group in &groups {
                        txn.put_group(group)?;
                    }
                    for node_id in members {
                        self.attach_in(txn, node_id, &cluster.id)?;
                    }
                    Ok(())
                })
            })
        })?;

        info!(
            cluster_id = %cluster.id,
            policy = %cluster.segmentation,
            networks = groups.len(),
            members = members.len(),
            "cluster created"
        );
        Ok(cluster)
    }

    /// Replace the cluster's node set: attach new members, detach dropped ones.
    pub fn set_cluster_nodes(
        &self,
        cluster_id: &str,
        nodes: &[NodeId],
    ) -> LifecycleResult<MembershipReport> {
        self.cluster_locks.with(cluster_id, || {
            let current = self.state.snapshot()?.list_cluster_nodes(cluster_id)?;
            let mut keys: Vec<&str> = nodes.iter().map(String::as_str).collect();
            keys.extend(current.iter().map(|n| n.id.as_str()));

            self.node_locks.with_all(&keys, || {
                self.state.transact(|txn| {
                    if txn.get_cluster(cluster_id)?.is_none() {
                        return Err(LifecycleError::ClusterNotFound(cluster_id.to_string()));
                    }
                    let wanted: BTreeSet<&str> = nodes.iter().map(String::as_str).collect();
                    let members: BTreeSet<String> = txn
                        .list_cluster_nodes(cluster_id)?
                        .into_iter()
                        .map(|n| n.id)
                        .collect();

                    let mut report = MembershipReport::default();
                    for node_id in &members {
                        if !wanted.contains(node_id.as_str()) {
                            self.detach_in(txn, node_id)?;
                            report.detached.push(node_id.clone());
                        }
                    }
                    for node_id in &wanted {
                        if !members.contains(*node_id) {
                            self.attach_in(txn, node_id, cluster_id)?;
                            report.attached.push(node_id.to_string());
                        }
                    }
                    info!(
                        %cluster_id,
                        attached = report.attached.len(),
                        detached = report.detached.len(),
                        "cluster membership replaced"
                    );
                    Ok(report)
                })
            })
        })
    }

    /// Delete a cluster, clearing the placement of every member first.
    ///
    /// The cluster's network groups go last, after no row references them.
    pub fn delete_cluster(&self, cluster_id: &str) -> LifecycleResult<CascadeReport> {
        self.cluster_locks.with(cluster_id, || {
            let members = self.state.snapshot()?.list_cluster_nodes(cluster_id)?;
            let keys: Vec<&str> = members.iter().map(|n| n.id.as_str()).collect();

            self.node_locks.with_all(&keys, || {
                self.state.transact(|txn| self.cascade_in(txn, cluster_id))
            })
        })
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Register a node with its discovered interfaces, optionally attaching it.
    pub fn register(
        &self,
        node_id: &str,
        primary_mac: &str,
        meta: &RawMeta,
        cluster_id: Option<&str>,
    ) -> LifecycleResult<NodeRecord> {
        validate_id(node_id)?;
        let primary_mac = normalize_mac(primary_mac);
        if primary_mac.is_empty() {
            return Err(PlacementError::Validation(format!(
                "node {node_id} has no primary hardware address"
            ))
            .into());
        }
        let interfaces = normalize(meta)?;
        if !interfaces.iter().any(|i| i.mac == primary_mac) {
            warn!(%node_id, %primary_mac, "primary hardware address not among reported interfaces");
        }

        let run = || {
            self.state.transact(|txn| {
                if txn.get_node(node_id)?.is_some() {
                    return Err(LifecycleError::DuplicateNode(node_id.to_string()));
                }
                let now = epoch_secs();
                txn.put_node(&NodeRecord {
                    id: node_id.to_string(),
                    primary_mac: primary_mac.clone(),
                    cluster_id: None,
                    created_at: now,
                    updated_at: now,
                })?;
                for interface in &interfaces {
                    txn.put_interface(&interface_record(node_id, interface))?;
                }
                match cluster_id {
                    Some(cluster_id) => self.attach_in(txn, node_id, cluster_id),
                    None => load_node(txn, node_id),
                }
            })
        };
        let node = match cluster_id {
            Some(cluster_id) => self
                .cluster_locks
                .with(cluster_id, || self.node_locks.with(node_id, run)),
            None => self.node_locks.with(node_id, run),
        }?;

        info!(
            %node_id,
            interfaces = interfaces.len(),
            cluster = node.cluster_id.as_deref().unwrap_or("-"),
            "node registered"
        );
        Ok(node)
    }

    /// Attach a node to a cluster and compute its default placement.
    ///
    /// A node already in another cluster moves: its old rows are replaced.
    /// Attaching to the current cluster keeps the stored placement.
    pub fn attach(&self, node_id: &str, cluster_id: &str) -> LifecycleResult<NodeRecord> {
        self.cluster_locks.with(cluster_id, || {
            self.node_locks.with(node_id, || {
                self.state
                    .transact(|txn| self.attach_in(txn, node_id, cluster_id))
            })
        })
    }

    /// Detach a node from its cluster, clearing every placement row.
    ///
    /// Returns `false` when the node was not attached.
    pub fn detach(&self, node_id: &str) -> LifecycleResult<bool> {
        self.node_locks.with(node_id, || {
            self.state.transact(|txn| self.detach_in(txn, node_id))
        })
    }

    /// Forget a node: its record, interfaces and placement rows.
    pub fn remove_node(&self, node_id: &str) -> LifecycleResult<()> {
        self.node_locks.with(node_id, || {
            self.state.transact(|txn| {
                let node = load_node(txn, node_id)?;
                txn.delete_node(node_id)?;
                info!(
                    %node_id,
                    cluster = node.cluster_id.as_deref().unwrap_or("-"),
                    "node removed"
                );
                Ok(())
            })
        })
    }

    /// Apply refreshed interface meta.
    ///
    /// Validation happens before anything is touched. The admin election
    /// failing aborts the update including the interface records.
    pub fn update_meta(&self, node_id: &str, meta: &RawMeta) -> LifecycleResult<MetaOutcome> {
        let incoming = normalize(meta)?;
        self.node_locks.with(node_id, || {
            self.state
                .transact(|txn| self.meta_in(txn, node_id, &incoming))
        })
    }

    /// Apply meta and membership changes to one node atomically.
    pub fn update_node(&self, update: &NodeUpdate) -> LifecycleResult<NodeRecord> {
        let incoming = update.meta.as_ref().map(normalize).transpose()?;
        let node_id = update.id.as_str();

        let run = || {
            self.state.transact(|txn| {
                if let Some(incoming) = &incoming {
                    let outcome = self.meta_in(txn, node_id, incoming)?;
                    debug!(%node_id, ?outcome, "node meta applied");
                }
                match &update.membership {
                    Membership::Keep => load_node(txn, node_id),
                    Membership::Join(cluster_id) => self.attach_in(txn, node_id, cluster_id),
                    Membership::Leave => {
                        self.detach_in(txn, node_id)?;
                        load_node(txn, node_id)
                    }
                }
            })
        };
        match &update.membership {
            Membership::Join(cluster_id) => self
                .cluster_locks
                .with(cluster_id, || self.node_locks.with(node_id, run)),
            _ => self.node_locks.with(node_id, run),
        }
    }

    /// Replace a node's assignment with an operator-chosen one.
    ///
    /// `placements` maps network names to interface names and must cover
    /// every network of the node's cluster. Each target must be allowed.
    pub fn reassign(
        &self,
        node_id: &str,
        placements: &BTreeMap<String, String>,
    ) -> LifecycleResult<Assignment> {
        self.node_locks.with(node_id, || {
            self.state.transact(|txn| {
                let node = load_node(txn, node_id)?;
                let cluster_id = node.cluster_id.as_deref().ok_or_else(|| {
                    PlacementError::Validation(format!("node {node_id} is not in a cluster"))
                })?;
                let topology = groups_for(cluster_id, txn.list_groups(cluster_id)?)?;
                let interfaces = interfaces_from_records(&txn.list_interfaces(node_id)?);

                for network in placements.keys() {
                    if topology.find(network).is_none() {
                        return Err(PlacementError::Validation(format!(
                            "cluster {cluster_id} has no network {network}"
                        ))
                        .into());
                    }
                }

                let mut assignment = Assignment::default();
                for group in topology.groups() {
                    let target = placements.get(&group.name).ok_or_else(|| {
                        PlacementError::Validation(format!("network {} is not placed", group.name))
                    })?;
                    let interface = interfaces
                        .iter()
                        .find(|i| &i.name == target)
                        .ok_or_else(|| {
                            PlacementError::Validation(format!(
                                "node {node_id} has no interface {target}"
                            ))
                        })?;
                    assignment.set(&group.id, &interface.mac);
                }

                verify(&assignment, &stored_allowed(&txn.list_allowed(node_id)?))?;
                write_assignment(txn, node_id, &assignment)?;
                info!(%node_id, %cluster_id, networks = assignment.len(), "assignment replaced");
                Ok(assignment)
            })
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Interfaces with their assigned and allowed networks.
    pub fn nics(&self, node_id: &str) -> LifecycleResult<Vec<NicView>> {
        views::node_nics(&self.state.snapshot()?, node_id)
    }

    /// What the default placement would be, without storing it.
    pub fn default_nics(&self, node_id: &str) -> LifecycleResult<Vec<NicView>> {
        views::default_nics(&self.state.snapshot()?, node_id)
    }

    pub fn interfaces(&self, node_id: &str) -> LifecycleResult<Vec<Interface>> {
        views::raw_interfaces(&self.state.snapshot()?, node_id)
    }

    pub fn admin_interface(&self, node_id: &str) -> LifecycleResult<netbind_placement::AdminElection> {
        views::admin_interface(&self.state.snapshot()?, node_id, &self.admin_cidr)
    }

    // ── Transaction bodies ─────────────────────────────────────────

    fn cascade_in(&self, txn: &StateTxn, cluster_id: &str) -> LifecycleResult<CascadeReport> {
        if txn.get_cluster(cluster_id)?.is_none() {
            return Err(LifecycleError::ClusterNotFound(cluster_id.to_string()));
        }

        let mut report = CascadeReport {
            cluster_id: cluster_id.to_string(),
            ..Default::default()
        };
        for mut node in txn.list_cluster_nodes(cluster_id)? {
            let cleared = txn.clear_placement(&node.id)?;
            debug!(
                node_id = %node.id,
                allowed = cleared.allowed,
                assignments = cleared.assignments,
                "cleared placement for cluster teardown"
            );
            node.cluster_id = None;
            node.updated_at = epoch_secs();
            txn.put_node(&node)?;
            report.cleared_nodes.push(node.id);
        }
        report.groups_deleted = txn.delete_groups(cluster_id)?;
        txn.delete_cluster(cluster_id)?;

        info!(
            %cluster_id,
            nodes = report.cleared_nodes.len(),
            groups = report.groups_deleted,
            "cluster deleted"
        );
        Ok(report)
    }

    fn attach_in(&self, txn: &StateTxn, node_id: &str, cluster_id: &str) -> LifecycleResult<NodeRecord> {
        let mut node = load_node(txn, node_id)?;
        let cluster = txn
            .get_cluster(cluster_id)?
            .ok_or_else(|| LifecycleError::ClusterNotFound(cluster_id.to_string()))?;

        match node.cluster_id.as_deref() {
            Some(current) if current == cluster_id => {
                if !txn.list_assignments(node_id)?.is_empty() {
                    debug!(%node_id, %cluster_id, "already attached, placement kept");
                    return Ok(node);
                }
            }
            Some(previous) => {
                info!(%node_id, from = previous, to = cluster_id, "moving node between clusters");
            }
            None => {}
        }

        let assignment = self.place(txn, &node, &cluster)?;
        node.cluster_id = Some(cluster.id.clone());
        node.updated_at = epoch_secs();
        txn.put_node(&node)?;

        info!(%node_id, %cluster_id, networks = assignment.len(), "node attached");
        Ok(node)
    }

    fn detach_in(&self, txn: &StateTxn, node_id: &str) -> LifecycleResult<bool> {
        let mut node = load_node(txn, node_id)?;
        let cleared = txn.clear_placement(node_id)?;
        let Some(cluster_id) = node.cluster_id.take() else {
            debug!(%node_id, "detach of unattached node");
            return Ok(false);
        };
        node.updated_at = epoch_secs();
        txn.put_node(&node)?;

        info!(
            %node_id,
            %cluster_id,
            allowed = cleared.allowed,
            assignments = cleared.assignments,
            "node detached"
        );
        Ok(true)
    }

    fn meta_in(&self, txn: &StateTxn, node_id: &str, incoming: &[Interface]) -> LifecycleResult<MetaOutcome> {
        let mut node = load_node(txn, node_id)?;
        let previous = interfaces_from_records(&txn.list_interfaces(node_id)?);
        let changes = diff(&previous, incoming);
        if changes.is_unchanged() {
            debug!(%node_id, "meta unchanged");
            return Ok(MetaOutcome::Unchanged);
        }

        for gone in &changes.removed {
            txn.delete_interface(node_id, &gone.mac)?;
        }
        for interface in &changes.added {
            txn.put_interface(&interface_record(node_id, interface))?;
        }
        for kept in changes.retained.iter().filter(|r| r.is_modified()) {
            txn.put_interface(&interface_record(node_id, &kept.current))?;
        }
        node.updated_at = epoch_secs();
        txn.put_node(&node)?;

        let Some(cluster_id) = node.cluster_id.as_deref() else {
            return Ok(MetaOutcome::Stored);
        };
        let cluster = txn
            .get_cluster(cluster_id)?
            .ok_or_else(|| LifecycleError::ClusterNotFound(cluster_id.to_string()))?;

        let outcome = if changes.topology_changed() || txn.list_assignments(node_id)?.is_empty() {
            self.place(txn, &node, &cluster)?;
            MetaOutcome::Recomputed
        } else {
            self.reelect_in(txn, &node, &cluster)?;
            MetaOutcome::Reelected
        };

        info!(
            %node_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            ?outcome,
            "node meta updated"
        );
        Ok(outcome)
    }

    /// Replace the node's allowed sets and assignment with the defaults.
    fn place(&self, txn: &StateTxn, node: &NodeRecord, cluster: &ClusterRecord) -> LifecycleResult<Assignment> {
        let topology = groups_for(&cluster.id, txn.list_groups(&cluster.id)?)?;
        let interfaces = interfaces_from_records(&txn.list_interfaces(&node.id)?);

        let allowed = compute_allowed(&interfaces, &topology);
        let assignment =
            compute_assignment(&interfaces, &topology, &node.primary_mac, &cluster.overrides)?;
        verify(&assignment, &allowed)?;

        txn.clear_placement(&node.id)?;
        for row in allowed_records(&node.id, &allowed) {
            txn.put_allowed(&row)?;
        }
        write_assignment(txn, &node.id, &assignment)?;
        Ok(assignment)
    }

    /// Move only the admin network; every other placement stays.
    fn reelect_in(&self, txn: &StateTxn, node: &NodeRecord, cluster: &ClusterRecord) -> LifecycleResult<Assignment> {
        let topology = groups_for(&cluster.id, txn.list_groups(&cluster.id)?)?;
        let interfaces = interfaces_from_records(&txn.list_interfaces(&node.id)?);
        let current = assignment_from_records(&txn.list_assignments(&node.id)?);

        let next = reelect(&current, &interfaces, &topology, &node.primary_mac)?;
        let admin = &topology.admin().id;
        if current.get(admin) != next.get(admin) {
            info!(
                node_id = %node.id,
                from = current.get(admin).unwrap_or("-"),
                to = next.get(admin).unwrap_or("-"),
                "admin network moved"
            );
        }
        write_assignment(txn, &node.id, &next)?;
        Ok(next)
    }
}

fn load_node(txn: &StateTxn, node_id: &str) -> LifecycleResult<NodeRecord> {
    txn.get_node(node_id)?
        .ok_or_else(|| LifecycleError::NodeNotFound(node_id.to_string()))
}

fn write_assignment(txn: &StateTxn, node_id: &str, assignment: &Assignment) -> LifecycleResult<()> {
    for row in assignment_records(node_id, assignment) {
        txn.put_assignment(&row)?;
    }
    Ok(())
}

fn stored_allowed(rows: &[AllowedNetworks]) -> netbind_placement::AllowedSet {
    rows.iter()
        .map(|r| (r.mac.clone(), r.groups.iter().cloned().collect()))
        .collect()
}

fn validate_id(id: &str) -> LifecycleResult<()> {
    if id.is_empty() || id.contains([':', '/']) {
        return Err(LifecycleError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Current time as Unix epoch seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
