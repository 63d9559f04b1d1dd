//! netbind-state: placement state store for netbind.
//!
//! Backed by [redb](https://docs.rs/redb), persists nodes, their discovered
//! interfaces, clusters with their network groups, and the two placement
//! relations derived from them: allowed networks per interface and the
//! network → interface assignment.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Per-node rows use `{node_id}:` key prefixes and per-cluster rows use
//! `{cluster_id}/`, so every placement scope is a single prefix scan.
//!
//! Multi-row changes go through [`StateStore::transact`], which runs a
//! closure inside one redb write transaction: it commits when the closure
//! returns `Ok` and aborts otherwise, so readers never see half-written
//! placement state. [`StateStore::snapshot`] gives a consistent read view.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{ClearedRows, StateSnapshot, StateStore, StateTxn};
pub use types::*;
