pub mod config;
pub mod types;

pub use config::{AdminConfig, ClusterConfig, NetbindConfig, StoreConfig};
pub use types::*;
