//! Shared types used across netbind crates.

use std::fmt;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admin/bootstrap CIDR used when a cluster does not configure its own.
pub const DEFAULT_ADMIN_CIDR: &str = "10.20.0.0/24";

/// Name of the admin network in policy-generated topologies.
pub const ADMIN_NETWORK: &str = "admin";

/// Name of the public network in policy-generated topologies.
pub const PUBLIC_NETWORK: &str = "public";

/// Link-layer scheme realizing the cluster's logical networks.
///
/// Only affects which networks exist and their order, never placement mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationPolicy {
    /// Single flat L2 segment (nova-network style FlatDHCP).
    #[default]
    Flat,
    /// VLAN-tagged tenant segmentation.
    Vlan,
    /// Tunnel-based (GRE) tenant segmentation.
    Tunnel,
}

impl SegmentationPolicy {
    /// Network definitions a cluster gets when it lists none explicitly.
    pub fn default_networks(&self) -> Vec<NetworkDef> {
        let tenant = match self {
            SegmentationPolicy::Flat => "fixed",
            SegmentationPolicy::Vlan | SegmentationPolicy::Tunnel => "private",
        };
        vec![
            NetworkDef::admin(ADMIN_NETWORK, default_admin_cidr()),
            NetworkDef::new(PUBLIC_NETWORK, NetworkRole::Public),
            NetworkDef::new("management", NetworkRole::Other),
            NetworkDef::new("storage", NetworkRole::Other),
            NetworkDef::new(tenant, NetworkRole::Other),
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationPolicy::Flat => "flat",
            SegmentationPolicy::Vlan => "vlan",
            SegmentationPolicy::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for SegmentationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown segmentation policy '{0}' (expected flat, vlan or tunnel)")]
pub struct ParsePolicyError(String);

impl FromStr for SegmentationPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "nova_network" => Ok(SegmentationPolicy::Flat),
            "vlan" => Ok(SegmentationPolicy::Vlan),
            "tunnel" | "gre" => Ok(SegmentationPolicy::Tunnel),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// Placement role of a logical network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRole {
    /// Admin/bootstrap network, elected from IP evidence.
    Admin,
    /// Externally routable network, placed on the second interface by name.
    Public,
    /// Management, storage, tenant and any other network.
    #[default]
    Other,
}

/// A logical network as declared by cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDef {
    pub name: String,
    #[serde(default)]
    pub role: NetworkRole,
    /// Only consulted for the admin network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<IpNet>,
}

impl NetworkDef {
    pub fn new(name: &str, role: NetworkRole) -> Self {
        Self {
            name: name.to_string(),
            role,
            cidr: None,
        }
    }

    pub fn admin(name: &str, cidr: IpNet) -> Self {
        Self {
            name: name.to_string(),
            role: NetworkRole::Admin,
            cidr: Some(cidr),
        }
    }
}

/// Parsed [`DEFAULT_ADMIN_CIDR`].
pub fn default_admin_cidr() -> IpNet {
    let net = ipnet::Ipv4Net::new(std::net::Ipv4Addr::new(10, 20, 0, 0), 24)
        .expect("24 is a valid IPv4 prefix length");
    IpNet::V4(net)
}
