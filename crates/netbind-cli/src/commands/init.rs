use std::path::Path;

use anyhow::Context as _;
use netbind_core::NetbindConfig;
use netbind_state::StateStore;
use tracing::info;

pub fn init(config_path: &Path, data_dir: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let config = NetbindConfig::scaffold(data_dir);
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    std::fs::write(config_path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", config_path.display()))?;
    StateStore::open(&config.store.path)?;

    info!(
        config = %config_path.display(),
        store = %config.store.path.display(),
        clusters = config.clusters.len(),
        "initialized"
    );
    println!("Wrote {}", config_path.display());
    println!("  Store: {}", config.store.path.display());
    println!("  Clusters: create them with `netbind cluster create <id>`");
    Ok(())
}
