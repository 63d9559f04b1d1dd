//! Type conversions between state store records and placement types.
//!
//! Bridges `netbind_state::{InterfaceRecord, AllowedNetworks, NetworkAssignment}`
//! to the engine's [`Interface`], [`AllowedSet`] and [`Assignment`].

use netbind_state::{AllowedNetworks, InterfaceRecord, NetworkAssignment};

use crate::catalog::{Interface, ordered};
use crate::engine::{AllowedSet, Assignment};

/// Convert stored interface records into ordered [`Interface`]s.
pub fn interfaces_from_records(records: &[InterfaceRecord]) -> Vec<Interface> {
    ordered(
        records
            .iter()
            .map(|r| Interface {
                name: r.name.clone(),
                mac: r.mac.clone(),
                ip: r.ip,
                ordinal: 0,
            })
            .collect(),
    )
}

/// Convert an [`Interface`] into its record for `node_id`.
pub fn interface_record(node_id: &str, interface: &Interface) -> InterfaceRecord {
    InterfaceRecord {
        node_id: node_id.to_string(),
        name: interface.name.clone(),
        mac: interface.mac.clone(),
        ip: interface.ip,
    }
}

/// One allowed-networks row per interface.
pub fn allowed_records(node_id: &str, allowed: &AllowedSet) -> Vec<AllowedNetworks> {
    allowed
        .iter()
        .map(|(mac, groups)| AllowedNetworks {
            node_id: node_id.to_string(),
            mac: mac.clone(),
            groups: groups.iter().cloned().collect(),
        })
        .collect()
}

/// One assignment row per network group.
pub fn assignment_records(node_id: &str, assignment: &Assignment) -> Vec<NetworkAssignment> {
    assignment
        .iter()
        .map(|(group_id, mac)| NetworkAssignment {
            node_id: node_id.to_string(),
            group_id: group_id.to_string(),
            mac: mac.to_string(),
        })
        .collect()
}

/// Rebuild an [`Assignment`] from stored rows.
pub fn assignment_from_records(records: &[NetworkAssignment]) -> Assignment {
    records
        .iter()
        .map(|r| (r.group_id.clone(), r.mac.clone()))
        .collect()
}
