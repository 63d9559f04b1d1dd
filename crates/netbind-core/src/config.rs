//! netbind.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::types::{NetworkDef, SegmentationPolicy, default_admin_cidr};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetbindConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/netbind/netbind.redb"),
        }
    }
}

/// Admin network used to elect the admin interface of detached nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub cidr: IpNet,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            cidr: default_admin_cidr(),
        }
    }
}

/// A cluster and the logical networks it places onto member nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub segmentation: SegmentationPolicy,
    /// Explicit network list. Empty means "use the policy defaults".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkDef>,
    /// Network name → interface name, replacing the default placement.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, String>,
}

impl ClusterConfig {
    pub fn new(id: &str, segmentation: SegmentationPolicy) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            segmentation,
            networks: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Networks in configured order, falling back to the policy defaults.
    pub fn network_defs(&self) -> Vec<NetworkDef> {
        if self.networks.is_empty() {
            self.segmentation.default_networks()
        } else {
            self.networks.clone()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl NetbindConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NetbindConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn cluster(&self, id: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// Scaffold a netbind.toml with one cluster per segmentation policy.
    pub fn scaffold(data_dir: &Path) -> Self {
        let mut vlan = ClusterConfig::new("vlan-cluster", SegmentationPolicy::Vlan);
        vlan.overrides
            .insert("storage".to_string(), "eth2".to_string());

        NetbindConfig {
            store: StoreConfig {
                path: data_dir.join("netbind.redb"),
            },
            admin: AdminConfig::default(),
            clusters: vec![
                ClusterConfig::new("flat-cluster", SegmentationPolicy::Flat),
                vlan,
                ClusterConfig::new("gre-cluster", SegmentationPolicy::Tunnel),
            ],
        }
    }
}
