use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use netbind_placement::RawMeta;

use super::{Context, print_json};

fn read_meta(path: &Path) -> anyhow::Result<RawMeta> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a `network=interface` pair.
pub fn parse_placement(s: &str) -> Result<(String, String), String> {
    let (network, interface) = s
        .split_once('=')
        .ok_or_else(|| format!("expected network=interface, got '{s}'"))?;
    if network.is_empty() || interface.is_empty() {
        return Err(format!("expected network=interface, got '{s}'"));
    }
    Ok((network.to_string(), interface.to_string()))
}

pub fn register(
    ctx: &Context,
    id: &str,
    mac: &str,
    meta: &Path,
    cluster: Option<&str>,
) -> anyhow::Result<()> {
    let meta = read_meta(meta)?;
    let node = ctx.coordinator.register(id, mac, &meta, cluster)?;
    print_json(&node)
}

pub fn attach(ctx: &Context, id: &str, cluster: &str) -> anyhow::Result<()> {
    let node = ctx.coordinator.attach(id, cluster)?;
    print_json(&node)
}

pub fn detach(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let detached = ctx.coordinator.detach(id)?;
    print_json(&serde_json::json!({ "node_id": id, "detached": detached }))
}

pub fn remove(ctx: &Context, id: &str) -> anyhow::Result<()> {
    ctx.coordinator.remove_node(id)?;
    print_json(&serde_json::json!({ "node_id": id, "removed": true }))
}

pub fn meta(ctx: &Context, id: &str, meta: &Path) -> anyhow::Result<()> {
    let meta = read_meta(meta)?;
    let outcome = ctx.coordinator.update_meta(id, &meta)?;
    print_json(&serde_json::json!({ "node_id": id, "outcome": outcome }))
}

pub fn nics(ctx: &Context, id: &str) -> anyhow::Result<()> {
    print_json(&ctx.coordinator.nics(id)?)
}

pub fn nics_default(ctx: &Context, id: &str) -> anyhow::Result<()> {
    print_json(&ctx.coordinator.default_nics(id)?)
}

pub fn interfaces(ctx: &Context, id: &str) -> anyhow::Result<()> {
    print_json(&ctx.coordinator.interfaces(id)?)
}

pub fn admin(ctx: &Context, id: &str) -> anyhow::Result<()> {
    print_json(&ctx.coordinator.admin_interface(id)?)
}

pub fn reassign(ctx: &Context, id: &str, placements: Vec<(String, String)>) -> anyhow::Result<()> {
    let placements: BTreeMap<String, String> = placements.into_iter().collect();
    let assignment = ctx.coordinator.reassign(id, &placements)?;
    let rows: BTreeMap<&str, &str> = assignment.iter().collect();
    print_json(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_pairs() {
        assert_eq!(
            parse_placement("storage=eth2").unwrap(),
            ("storage".to_string(), "eth2".to_string())
        );
        assert!(parse_placement("storage").is_err());
        assert!(parse_placement("=eth2").is_err());
    }

    #[test]
    fn meta_file_is_read_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(
            &path,
            r#"{"interfaces": [{"name": "eth0", "mac": "aa", "ip": "10.20.0.2"}]}"#,
        )
        .unwrap();

        let meta = read_meta(&path).unwrap();
        assert_eq!(meta.interfaces.unwrap().len(), 1);
        assert!(read_meta(&dir.path().join("missing.json")).is_err());
    }
}
