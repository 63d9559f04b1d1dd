use super::{Context, print_json};

pub fn create(ctx: &Context, id: &str, nodes: &[String]) -> anyhow::Result<()> {
    let Some(config) = ctx.config.cluster(id) else {
        anyhow::bail!("cluster {id} is not defined in the configuration file");
    };
    let cluster = ctx.coordinator.create_cluster(config, nodes)?;
    print_json(&cluster)
}

pub fn delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let report = ctx.coordinator.delete_cluster(id)?;
    print_json(&report)
}

pub fn set_nodes(ctx: &Context, id: &str, nodes: &[String]) -> anyhow::Result<()> {
    let report = ctx.coordinator.set_cluster_nodes(id, nodes)?;
    print_json(&report)
}

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let clusters = ctx.coordinator.state().list_clusters()?;
    print_json(&clusters)
}
