//! Interface catalog: turns discovered interface meta into typed records.
//!
//! Meta arrives from node agents and is untrusted: every field is optional
//! on the wire and validated once here. Downstream code works only with
//! [`Interface`] values, sorted by name with their ordinal assigned.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// Interface meta as reported by a node agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMeta {
    #[serde(default)]
    pub interfaces: Option<Vec<RawInterface>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "hardware_address")]
    pub mac: Option<String>,
    #[serde(default, alias = "ip_address", alias = "ip_addr")]
    pub ip: Option<String>,
}

impl RawInterface {
    pub fn new(name: &str, mac: &str, ip: Option<&str>) -> Self {
        Self {
            name: Some(name.to_string()),
            mac: Some(mac.to_string()),
            ip: ip.map(str::to_string),
        }
    }
}

impl RawMeta {
    pub fn with_interfaces(interfaces: Vec<RawInterface>) -> Self {
        Self {
            interfaces: Some(interfaces),
        }
    }
}

/// A validated physical interface of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    /// Stable identity across meta updates.
    pub mac: String,
    pub ip: Option<IpAddr>,
    /// Position in lexicographic name order.
    pub ordinal: usize,
}

/// Canonical form of a hardware address.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase()
}

/// Validate raw meta into interfaces ordered by name.
///
/// Fails when the interface list is missing or empty, or when a name or
/// hardware address is missing or repeated, or an IP does not parse.
pub fn normalize(meta: &RawMeta) -> PlacementResult<Vec<Interface>> {
    let raw = match &meta.interfaces {
        None => return Err(PlacementError::Validation("meta has no interface list".into())),
        Some(list) if list.is_empty() => {
            return Err(PlacementError::Validation("meta interface list is empty".into()));
        }
        Some(list) => list,
    };

    let mut macs = HashSet::new();
    let mut names = HashSet::new();
    let mut interfaces = Vec::with_capacity(raw.len());

    for (index, entry) in raw.iter().enumerate() {
        let mac = entry
            .mac
            .as_deref()
            .map(normalize_mac)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                PlacementError::Validation(format!("interface #{index} has no hardware address"))
            })?;
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PlacementError::Validation(format!("interface {mac} has no name")))?
            .to_string();

        if !macs.insert(mac.clone()) {
            return Err(PlacementError::Validation(format!(
                "duplicate hardware address {mac}"
            )));
        }
        if !names.insert(name.clone()) {
            return Err(PlacementError::Validation(format!(
                "duplicate interface name {name}"
            )));
        }

        let ip = match entry.ip.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(text.parse::<IpAddr>().map_err(|_| {
                PlacementError::Validation(format!("interface {name} has invalid IP '{text}'"))
            })?),
        };

        interfaces.push(Interface {
            name,
            mac,
            ip,
            ordinal: 0,
        });
    }

    Ok(ordered(interfaces))
}

/// Sort interfaces by name and assign ordinals.
pub fn ordered(mut interfaces: Vec<Interface>) -> Vec<Interface> {
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    for (ordinal, interface) in interfaces.iter_mut().enumerate() {
        interface.ordinal = ordinal;
    }
    interfaces
}

/// An interface present both before and after a meta update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedInterface {
    pub previous: Interface,
    pub current: Interface,
}

impl RetainedInterface {
    pub fn ip_changed(&self) -> bool {
        self.previous.ip != self.current.ip
    }

    pub fn renamed(&self) -> bool {
        self.previous.name != self.current.name
    }

    pub fn is_modified(&self) -> bool {
        self.ip_changed() || self.renamed()
    }
}

/// Difference between two interface sets, keyed by hardware address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceDiff {
    pub added: Vec<Interface>,
    pub removed: Vec<Interface>,
    pub retained: Vec<RetainedInterface>,
}

impl InterfaceDiff {
    /// Interfaces came or went, or a rename reshuffled the name order.
    pub fn topology_changed(&self) -> bool {
        !self.added.is_empty()
            || !self.removed.is_empty()
            || self.retained.iter().any(RetainedInterface::renamed)
    }

    pub fn ip_changed(&self) -> bool {
        self.retained.iter().any(RetainedInterface::ip_changed)
    }

    pub fn is_unchanged(&self) -> bool {
        !self.topology_changed() && !self.ip_changed()
    }
}

/// Diff `incoming` against `previous`.
///
/// A retained hardware address is an in-place update even if its name or IP
/// changed, so rows keyed by that interface survive the update.
pub fn diff(previous: &[Interface], incoming: &[Interface]) -> InterfaceDiff {
    let before: BTreeMap<&str, &Interface> =
        previous.iter().map(|i| (i.mac.as_str(), i)).collect();
    let after: BTreeMap<&str, &Interface> =
        incoming.iter().map(|i| (i.mac.as_str(), i)).collect();

    let mut result = InterfaceDiff::default();
    for interface in incoming {
        match before.get(interface.mac.as_str()) {
            Some(prev) => result.retained.push(RetainedInterface {
                previous: (*prev).clone(),
                current: interface.clone(),
            }),
            None => result.added.push(interface.clone()),
        }
    }
    result.removed = previous
        .iter()
        .filter(|i| !after.contains_key(i.mac.as_str()))
        .cloned()
        .collect();
    result
}
