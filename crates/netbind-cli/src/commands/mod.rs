pub mod cluster;
pub mod init;
pub mod node;

use std::path::Path;

use anyhow::Context as _;
use netbind_cluster::LifecycleCoordinator;
use netbind_core::NetbindConfig;
use netbind_state::StateStore;
use serde::Serialize;
use tracing::debug;

/// Loaded configuration plus a coordinator over its store.
pub struct Context {
    pub config: NetbindConfig,
    pub coordinator: LifecycleCoordinator,
}

impl Context {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config = if config_path.exists() {
            NetbindConfig::from_file(config_path)?
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            NetbindConfig::default()
        };
        let store = StateStore::open(&config.store.path)
            .with_context(|| format!("opening state store {}", config.store.path.display()))?;
        let coordinator = LifecycleCoordinator::new(store).with_admin_cidr(config.admin.cidr);
        Ok(Self { config, coordinator })
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
