use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "netbind",
    about = "netbind — bind cluster networks to node interfaces",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "netbind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration scaffold and create the state store
    Init {
        /// Directory for the state database
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Manage clusters
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
    /// Manage nodes and their interface placement
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// Create a cluster defined in the configuration file
    Create {
        id: String,
        /// Nodes to attach on creation
        #[arg(short, long = "node")]
        nodes: Vec<String>,
    },
    /// Delete a cluster, clearing the placement of all its nodes
    Delete { id: String },
    /// Replace the cluster's node set
    Nodes {
        id: String,
        #[arg(short, long = "node")]
        nodes: Vec<String>,
    },
    /// List stored clusters
    List,
}

#[derive(Subcommand)]
enum NodeAction {
    /// Register a node from its interface meta (JSON)
    Register {
        id: String,
        /// Hardware address the node booted from
        #[arg(long)]
        mac: String,
        #[arg(long)]
        meta: PathBuf,
        /// Attach to this cluster right away
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Attach a node to a cluster
    Attach { id: String, cluster: String },
    /// Detach a node from its cluster
    Detach { id: String },
    /// Remove a node with its interfaces and placement
    Remove { id: String },
    /// Apply refreshed interface meta (JSON)
    Meta {
        id: String,
        #[arg(long)]
        meta: PathBuf,
    },
    /// Show interfaces with assigned and allowed networks
    Nics { id: String },
    /// Show the default placement without storing it
    NicsDefault { id: String },
    /// Show the last-reported interfaces
    Interfaces { id: String },
    /// Show which interface carries the admin network
    Admin { id: String },
    /// Replace the assignment, e.g. `--place admin=eth0 --place public=eth1`
    Reassign {
        id: String,
        #[arg(long = "place", value_parser = commands::node::parse_placement)]
        placements: Vec<(String, String)>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("netbind=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir, force } => commands::init::init(&cli.config, &data_dir, force),
        Commands::Cluster { action } => {
            let ctx = commands::Context::load(&cli.config)?;
            match action {
                ClusterAction::Create { id, nodes } => commands::cluster::create(&ctx, &id, &nodes),
                ClusterAction::Delete { id } => commands::cluster::delete(&ctx, &id),
                ClusterAction::Nodes { id, nodes } => commands::cluster::set_nodes(&ctx, &id, &nodes),
                ClusterAction::List => commands::cluster::list(&ctx),
            }
        }
        Commands::Node { action } => {
            let ctx = commands::Context::load(&cli.config)?;
            match action {
                NodeAction::Register { id, mac, meta, cluster } => {
                    commands::node::register(&ctx, &id, &mac, &meta, cluster.as_deref())
                }
                NodeAction::Attach { id, cluster } => commands::node::attach(&ctx, &id, &cluster),
                NodeAction::Detach { id } => commands::node::detach(&ctx, &id),
                NodeAction::Remove { id } => commands::node::remove(&ctx, &id),
                NodeAction::Meta { id, meta } => commands::node::meta(&ctx, &id, &meta),
                NodeAction::Nics { id } => commands::node::nics(&ctx, &id),
                NodeAction::NicsDefault { id } => commands::node::nics_default(&ctx, &id),
                NodeAction::Interfaces { id } => commands::node::interfaces(&ctx, &id),
                NodeAction::Admin { id } => commands::node::admin(&ctx, &id),
                NodeAction::Reassign { id, placements } => {
                    commands::node::reassign(&ctx, &id, placements)
                }
            }
        }
    }
}
