//! Assignment engine: decides where each logical network lives on a node.
//!
//! Given a node's interfaces and its cluster's topology, the engine computes:
//! 1. The allowed set: which networks each interface may carry
//! 2. The admin election: the interface holding an address in the admin CIDR
//! 3. The default assignment: one interface per network, deterministic
//!
//! Placement rules for the default assignment:
//! - **Admin** goes to the elected interface. No address match falls back to
//!   the node's primary interface.
//! - **Public** goes to the second interface by name, skipping the admin one.
//! - **Everything else** goes to the primary interface, or to the first
//!   non-admin interface when the primary one already carries admin.
//! - Operator overrides replace the default for any non-admin network.

use std::collections::{BTreeMap, BTreeSet};

use ipnet::IpNet;
use netbind_state::{GroupId, HardwareAddress};
use serde::Serialize;
use tracing::debug;

use crate::catalog::Interface;
use crate::error::{PlacementError, PlacementResult};
use crate::topology::NetworkTopology;

/// Interface hardware address → networks it may carry.
pub type AllowedSet = BTreeMap<HardwareAddress, BTreeSet<GroupId>>;

/// Network group → hardware address of the interface carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assignment {
    placements: BTreeMap<GroupId, HardwareAddress>,
}

impl Assignment {
    pub fn get(&self, group_id: &str) -> Option<&str> {
        self.placements.get(group_id).map(String::as_str)
    }

    pub fn set(&mut self, group_id: &str, mac: &str) {
        self.placements.insert(group_id.to_string(), mac.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.placements
            .iter()
            .map(|(group, mac)| (group.as_str(), mac.as_str()))
    }

    /// Networks carried by one interface.
    pub fn networks_on(&self, mac: &str) -> Vec<&str> {
        self.iter()
            .filter(|(_, m)| *m == mac)
            .map(|(group, _)| group)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

impl FromIterator<(GroupId, HardwareAddress)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (GroupId, HardwareAddress)>>(iter: I) -> Self {
        Self {
            placements: iter.into_iter().collect(),
        }
    }
}

/// Why an interface won the admin election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionBasis {
    /// Its IP lies inside the admin CIDR.
    AddressMatch,
    /// No address matched; it is the interface the node registered with.
    PrimaryAddress,
    /// No address matched and the primary address is not present.
    FirstInterface,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminElection {
    pub name: String,
    pub mac: HardwareAddress,
    pub basis: ElectionBasis,
}

/// Every network is allowed on every interface.
///
/// Interfaces without an IP are eligible too: IP evidence only drives
/// assignment, never eligibility.
pub fn compute_allowed(interfaces: &[Interface], topology: &NetworkTopology) -> AllowedSet {
    let all: BTreeSet<GroupId> = topology.groups().iter().map(|g| g.id.clone()).collect();
    interfaces
        .iter()
        .map(|i| (i.mac.clone(), all.clone()))
        .collect()
}

/// Elect the admin interface from IP evidence.
///
/// Exactly one interface inside `admin_cidr` wins. None falls back to the
/// primary interface (or the first by name if it is gone). Several is an
/// ambiguous election and fails.
pub fn elect_admin(
    interfaces: &[Interface],
    admin_cidr: &IpNet,
    primary_mac: &str,
) -> PlacementResult<AdminElection> {
    let matches: Vec<&Interface> = interfaces
        .iter()
        .filter(|i| i.ip.is_some_and(|ip| admin_cidr.contains(&ip)))
        .collect();

    let (winner, basis) = match matches.as_slice() {
        [only] => (*only, ElectionBasis::AddressMatch),
        [] => match interfaces.iter().find(|i| i.mac == primary_mac) {
            Some(primary) => (primary, ElectionBasis::PrimaryAddress),
            None => {
                let first = by_name(interfaces)
                    .into_iter()
                    .next()
                    .ok_or_else(|| PlacementError::Validation("node has no interfaces".into()))?;
                (first, ElectionBasis::FirstInterface)
            }
        },
        several => {
            return Err(PlacementError::AmbiguousAdmin {
                cidr: *admin_cidr,
                candidates: several
                    .iter()
                    .map(|i| format!("{} ({})", i.name, i.mac))
                    .collect(),
            });
        }
    };

    debug!(interface = %winner.name, mac = %winner.mac, ?basis, "admin interface elected");
    Ok(AdminElection {
        name: winner.name.clone(),
        mac: winner.mac.clone(),
        basis,
    })
}

/// Compute the default network → interface assignment.
///
/// Deterministic in its arguments. Overrides map network names to interface
/// names and win over the default for every network except admin.
pub fn compute_assignment(
    interfaces: &[Interface],
    topology: &NetworkTopology,
    primary_mac: &str,
    overrides: &BTreeMap<String, String>,
) -> PlacementResult<Assignment> {
    let sorted = by_name(interfaces);
    if sorted.is_empty() {
        return Err(PlacementError::Validation("node has no interfaces".into()));
    }

    let election = elect_admin(interfaces, &topology.admin_cidr(), primary_mac)?;
    let admin_mac = election.mac.as_str();

    let mut assignment = Assignment::default();
    assignment.set(&topology.admin().id, admin_mac);

    if let Some(public) = topology.public() {
        let mac = override_target(&sorted, &public.name, overrides)?
            .unwrap_or_else(|| public_interface(&sorted, admin_mac));
        assignment.set(&public.id, mac);
    }

    let anchor = main_interface(&sorted, admin_mac, primary_mac);
    for group in topology.remaining() {
        let mac = override_target(&sorted, &group.name, overrides)?.unwrap_or(anchor);
        assignment.set(&group.id, mac);
    }

    verify(&assignment, &compute_allowed(interfaces, topology))?;

    debug!(
        cluster = topology.cluster_id(),
        admin = admin_mac,
        networks = assignment.len(),
        "default assignment computed"
    );
    Ok(assignment)
}

/// Re-run the admin election only, keeping every other placement.
pub fn reelect(
    current: &Assignment,
    interfaces: &[Interface],
    topology: &NetworkTopology,
    primary_mac: &str,
) -> PlacementResult<Assignment> {
    let election = elect_admin(interfaces, &topology.admin_cidr(), primary_mac)?;
    let mut next = current.clone();
    next.set(&topology.admin().id, &election.mac);
    verify(&next, &compute_allowed(interfaces, topology))?;
    Ok(next)
}

/// Check every placement targets an interface whose allowed set has the network.
pub fn verify(assignment: &Assignment, allowed: &AllowedSet) -> PlacementResult<()> {
    for (group, mac) in assignment.iter() {
        let permitted = allowed.get(mac).is_some_and(|groups| groups.contains(group));
        if !permitted {
            return Err(PlacementError::NotAllowed {
                group: group.to_string(),
                mac: mac.to_string(),
            });
        }
    }
    Ok(())
}

fn by_name(interfaces: &[Interface]) -> Vec<&Interface> {
    let mut sorted: Vec<&Interface> = interfaces.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// First non-admin interface at sorted position >= 1.
///
/// Falls back to the first non-admin interface, then to admin itself on a
/// single-interface node.
fn public_interface<'a>(sorted: &[&'a Interface], admin_mac: &'a str) -> &'a str {
    sorted
        .iter()
        .copied()
        .skip(1)
        .find(|i| i.mac != admin_mac)
        .or_else(|| sorted.iter().copied().find(|i| i.mac != admin_mac))
        .map_or(admin_mac, |i| i.mac.as_str())
}

/// Interface hosting the networks without a dedicated rule.
fn main_interface<'a>(sorted: &[&'a Interface], admin_mac: &'a str, primary_mac: &str) -> &'a str {
    let primary = sorted
        .iter()
        .copied()
        .find(|i| i.mac == primary_mac)
        .unwrap_or(sorted[0]);
    if primary.mac != admin_mac {
        return primary.mac.as_str();
    }
    sorted
        .iter()
        .copied()
        .find(|i| i.mac != admin_mac)
        .map_or(admin_mac, |i| i.mac.as_str())
}

fn override_target<'a>(
    sorted: &[&'a Interface],
    network: &str,
    overrides: &BTreeMap<String, String>,
) -> PlacementResult<Option<&'a str>> {
    let Some(name) = overrides.get(network) else {
        return Ok(None);
    };
    sorted
        .iter()
        .copied()
        .find(|i| &i.name == name)
        .map(|i| Some(i.mac.as_str()))
        .ok_or_else(|| PlacementError::UnknownOverride {
            network: network.to_string(),
            interface: name.clone(),
        })
}
