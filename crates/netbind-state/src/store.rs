//! StateStore: redb-backed state persistence for netbind.
//!
//! Reads go through a [`StateSnapshot`] (one redb read transaction) and
//! writes through a [`StateTxn`] (one redb write transaction), so every
//! multi-row placement change is observed either completely or not at all.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            CLUSTERS,
            NETWORK_GROUPS,
            NODES,
            INTERFACES,
            ALLOWED_NETWORKS,
            ASSIGNMENTS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Open a consistent read view over all tables.
    pub fn snapshot(&self) -> StateResult<StateSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        Ok(StateSnapshot { txn })
    }

    /// Run `f` inside a single write transaction.
    ///
    /// Commits when `f` returns `Ok`. Any `Err` aborts the transaction and
    /// discards every write `f` made.
    pub fn transact<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StateTxn) -> Result<T, E>,
        E: From<StateError>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let scope = StateTxn { txn };
        match f(&scope) {
            Ok(value) => {
                scope.txn.commit().map_err(map_err!(Transaction))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = scope.txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(err)
            }
        }
    }

    // ── Convenience reads ──────────────────────────────────────────

    pub fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterRecord>> {
        self.snapshot()?.get_cluster(cluster_id)
    }

    pub fn list_clusters(&self) -> StateResult<Vec<ClusterRecord>> {
        self.snapshot()?.list_clusters()
    }

    pub fn list_groups(&self, cluster_id: &str) -> StateResult<Vec<NetworkGroup>> {
        self.snapshot()?.list_groups(cluster_id)
    }

    pub fn get_node(&self, node_id: &str) -> StateResult<Option<NodeRecord>> {
        self.snapshot()?.get_node(node_id)
    }

    pub fn list_nodes(&self) -> StateResult<Vec<NodeRecord>> {
        self.snapshot()?.list_nodes()
    }

    pub fn list_interfaces(&self, node_id: &str) -> StateResult<Vec<InterfaceRecord>> {
        self.snapshot()?.list_interfaces(node_id)
    }

    pub fn list_allowed(&self, node_id: &str) -> StateResult<Vec<AllowedNetworks>> {
        self.snapshot()?.list_allowed(node_id)
    }

    pub fn list_assignments(&self, node_id: &str) -> StateResult<Vec<NetworkAssignment>> {
        self.snapshot()?.list_assignments(node_id)
    }
}

/// Read-only view backed by one redb read transaction.
pub struct StateSnapshot {
    txn: redb::ReadTransaction,
}

/// Read-write scope backed by one redb write transaction.
///
/// Only reachable through [`StateStore::transact`].
pub struct StateTxn {
    txn: redb::WriteTransaction,
}

/// Typed reads shared by [`StateSnapshot`] and [`StateTxn`].
macro_rules! read_ops {
    ($scope:ty) => {
        impl $scope {
            pub fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterRecord>> {
                let table = self.txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
                get_json(&table, cluster_id)
            }

            pub fn list_clusters(&self) -> StateResult<Vec<ClusterRecord>> {
                let table = self.txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
                scan_prefix(&table, "")
            }

            /// Network groups of a cluster in configured order.
            pub fn list_groups(&self, cluster_id: &str) -> StateResult<Vec<NetworkGroup>> {
                let table = self.txn.open_table(NETWORK_GROUPS).map_err(map_err!(Table))?;
                let mut groups: Vec<NetworkGroup> =
                    scan_prefix(&table, &cluster_prefix(cluster_id))?;
                groups.sort_by_key(|g| g.position);
                Ok(groups)
            }

            pub fn get_node(&self, node_id: &str) -> StateResult<Option<NodeRecord>> {
                let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
                get_json(&table, node_id)
            }

            pub fn list_nodes(&self) -> StateResult<Vec<NodeRecord>> {
                let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
                scan_prefix(&table, "")
            }

            /// Nodes whose membership points at `cluster_id`.
            pub fn list_cluster_nodes(&self, cluster_id: &str) -> StateResult<Vec<NodeRecord>> {
                Ok(self
                    .list_nodes()?
                    .into_iter()
                    .filter(|n| n.cluster_id.as_deref() == Some(cluster_id))
                    .collect())
            }

            /// Interfaces of a node sorted by name.
            pub fn list_interfaces(&self, node_id: &str) -> StateResult<Vec<InterfaceRecord>> {
                let table = self.txn.open_table(INTERFACES).map_err(map_err!(Table))?;
                let mut interfaces: Vec<InterfaceRecord> =
                    scan_prefix(&table, &node_prefix(node_id))?;
                interfaces.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(interfaces)
            }

            pub fn list_allowed(&self, node_id: &str) -> StateResult<Vec<AllowedNetworks>> {
                let table = self
                    .txn
                    .open_table(ALLOWED_NETWORKS)
                    .map_err(map_err!(Table))?;
                scan_prefix(&table, &node_prefix(node_id))
            }

            pub fn list_assignments(&self, node_id: &str) -> StateResult<Vec<NetworkAssignment>> {
                let table = self.txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
                scan_prefix(&table, &node_prefix(node_id))
            }
        }
    };
}

read_ops!(StateSnapshot);
read_ops!(StateTxn);

/// Row counts removed by [`StateTxn::clear_placement`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedRows {
    pub allowed: u32,
    pub assignments: u32,
}

impl StateTxn {
    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        table
            .insert(key, bytes.as_slice())
            .map_err(map_err!(Write))?;
        Ok(())
    }

    fn remove(&self, def: JsonTable, key: &str) -> StateResult<bool> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        Ok(existed)
    }

    fn remove_prefix(&self, def: JsonTable, prefix: &str) -> StateResult<u32> {
        let mut table = self.txn.open_table(def).map_err(map_err!(Table))?;
        let keys = keys_with_prefix(&table, prefix)?;
        for key in &keys {
            table.remove(key.as_str()).map_err(map_err!(Write))?;
        }
        Ok(keys.len() as u32)
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn put_cluster(&self, cluster: &ClusterRecord) -> StateResult<()> {
        self.put_json(CLUSTERS, &cluster.id, cluster)?;
        debug!(cluster = %cluster.id, "cluster stored");
        Ok(())
    }

    pub fn delete_cluster(&self, cluster_id: &str) -> StateResult<bool> {
        self.remove(CLUSTERS, cluster_id)
    }

    pub fn put_group(&self, group: &NetworkGroup) -> StateResult<()> {
        self.put_json(NETWORK_GROUPS, &group.id, group)
    }

    /// Delete every network group of a cluster. Returns number deleted.
    pub fn delete_groups(&self, cluster_id: &str) -> StateResult<u32> {
        self.remove_prefix(NETWORK_GROUPS, &cluster_prefix(cluster_id))
    }

    // ── Nodes ──────────────────────────────────────────────────────

    pub fn put_node(&self, node: &NodeRecord) -> StateResult<()> {
        self.put_json(NODES, &node.id, node)
    }

    /// Delete a node with its interfaces and placement rows.
    pub fn delete_node(&self, node_id: &str) -> StateResult<bool> {
        self.clear_placement(node_id)?;
        self.remove_prefix(INTERFACES, &node_prefix(node_id))?;
        self.remove(NODES, node_id)
    }

    pub fn put_interface(&self, interface: &InterfaceRecord) -> StateResult<()> {
        self.put_json(INTERFACES, &interface.table_key(), interface)
    }

    /// Delete an interface together with its allowed-networks row.
    pub fn delete_interface(&self, node_id: &str, mac: &str) -> StateResult<bool> {
        let key = interface_key(node_id, mac);
        self.remove(ALLOWED_NETWORKS, &key)?;
        self.remove(INTERFACES, &key)
    }

    // ── Placement ──────────────────────────────────────────────────

    pub fn put_allowed(&self, allowed: &AllowedNetworks) -> StateResult<()> {
        self.put_json(ALLOWED_NETWORKS, &allowed.table_key(), allowed)
    }

    pub fn put_assignment(&self, assignment: &NetworkAssignment) -> StateResult<()> {
        self.put_json(ASSIGNMENTS, &assignment.table_key(), assignment)
    }

    /// Delete every allowed-networks and assignment row of a node.
    pub fn clear_placement(&self, node_id: &str) -> StateResult<ClearedRows> {
        let prefix = node_prefix(node_id);
        let cleared = ClearedRows {
            allowed: self.remove_prefix(ALLOWED_NETWORKS, &prefix)?,
            assignments: self.remove_prefix(ASSIGNMENTS, &prefix)?,
        };
        debug!(%node_id, allowed = cleared.allowed, assignments = cleared.assignments, "placement cleared");
        Ok(cleared)
    }
}

fn get_json<T, R>(table: &R, key: &str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(key, guard.value())?)),
        None => Ok(None),
    }
}

fn scan_prefix<T, R>(table: &R, prefix: &str) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if !key.value().starts_with(prefix) {
            break;
        }
        results.push(decode(key.value(), value.value())?);
    }
    Ok(results)
}

fn keys_with_prefix<R>(table: &R, prefix: &str) -> StateResult<Vec<String>>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut keys = Vec::new();
    for entry in table.range(prefix..).map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use netbind_core::{NetworkRole, SegmentationPolicy};

    fn test_cluster(id: &str) -> ClusterRecord {
        ClusterRecord {
            id: id.to_string(),
            name: id.to_string(),
            segmentation: SegmentationPolicy::Vlan,
            overrides: BTreeMap::new(),
            created_at: 1000,
        }
    }

    fn test_group(cluster_id: &str, name: &str, position: u32) -> NetworkGroup {
        NetworkGroup {
            id: NetworkGroup::group_id(cluster_id, name),
            cluster_id: cluster_id.to_string(),
            name: name.to_string(),
            role: NetworkRole::Other,
            cidr: None,
            position,
        }
    }

    fn test_node(id: &str, cluster_id: Option<&str>) -> NodeRecord {
        NodeRecord {
            id: id.to_string(),
            primary_mac: "123".to_string(),
            cluster_id: cluster_id.map(str::to_string),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_interface(node_id: &str, name: &str, mac: &str) -> InterfaceRecord {
        InterfaceRecord {
            node_id: node_id.to_string(),
            name: name.to_string(),
            mac: mac.to_string(),
            ip: None,
        }
    }

    fn seed_placement(txn: &StateTxn, node_id: &str, macs: &[&str]) -> StateResult<()> {
        for mac in macs {
            txn.put_allowed(&AllowedNetworks {
                node_id: node_id.to_string(),
                mac: mac.to_string(),
                groups: vec!["c1/admin".to_string(), "c1/public".to_string()],
            })?;
        }
        txn.put_assignment(&NetworkAssignment {
            node_id: node_id.to_string(),
            group_id: "c1/admin".to_string(),
            mac: macs[0].to_string(),
        })?;
        txn.put_assignment(&NetworkAssignment {
            node_id: node_id.to_string(),
            group_id: "c1/public".to_string(),
            mac: macs[macs.len() - 1].to_string(),
        })
    }

    // ── Clusters and groups ────────────────────────────────────────

    #[test]
    fn cluster_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let cluster = test_cluster("c1");

        store
            .transact(|txn| txn.put_cluster(&cluster))
            .unwrap();

        assert_eq!(store.get_cluster("c1").unwrap(), Some(cluster));
        assert!(store.get_cluster("c2").unwrap().is_none());
    }

    #[test]
    fn groups_listed_in_configured_order() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_group(&test_group("c1", "storage", 3))?;
                txn.put_group(&test_group("c1", "admin", 0))?;
                txn.put_group(&test_group("c1", "public", 1))?;
                txn.put_group(&test_group("c10", "admin", 0))
            })
            .unwrap();

        let names: Vec<_> = store
            .list_groups("c1")
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, ["admin", "public", "storage"]);
    }

    #[test]
    fn delete_groups_is_cluster_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        let deleted = store
            .transact(|txn| {
                txn.put_group(&test_group("c1", "admin", 0))?;
                txn.put_group(&test_group("c1", "public", 1))?;
                txn.put_group(&test_group("c10", "admin", 0))?;
                txn.delete_groups("c1")
            })
            .unwrap();

        assert_eq!(deleted, 2);
        assert!(store.list_groups("c1").unwrap().is_empty());
        assert_eq!(store.list_groups("c10").unwrap().len(), 1);
    }

    // ── Nodes and interfaces ───────────────────────────────────────

    #[test]
    fn cluster_nodes_filtered_by_membership() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_node(&test_node("n1", Some("c1")))?;
                txn.put_node(&test_node("n2", Some("c2")))?;
                txn.put_node(&test_node("n3", None))
            })
            .unwrap();

        let snapshot = store.snapshot().unwrap();
        let members = snapshot.list_cluster_nodes("c1").unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "n1");
        assert_eq!(snapshot.list_nodes().unwrap().len(), 3);
    }

    #[test]
    fn interfaces_sorted_by_name_and_node_scoped() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_interface(&test_interface("n1", "eth1", "654"))?;
                txn.put_interface(&test_interface("n1", "eth0", "123"))?;
                txn.put_interface(&test_interface("n10", "eth0", "999"))
            })
            .unwrap();

        let names: Vec<_> = store
            .list_interfaces("n1")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["eth0", "eth1"]);
    }

    #[test]
    fn delete_interface_drops_allowed_row() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_interface(&test_interface("n1", "eth0", "123"))?;
                txn.put_interface(&test_interface("n1", "eth1", "654"))?;
                seed_placement(txn, "n1", &["123", "654"])
            })
            .unwrap();

        let existed = store
            .transact(|txn| txn.delete_interface("n1", "654"))
            .unwrap();

        assert!(existed);
        assert_eq!(store.list_interfaces("n1").unwrap().len(), 1);
        let allowed = store.list_allowed("n1").unwrap();
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].mac, "123");
    }

    #[test]
    fn delete_node_takes_its_rows_along() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_node(&test_node("n1", Some("c1")))?;
                txn.put_node(&test_node("n2", Some("c1")))?;
                txn.put_interface(&test_interface("n1", "eth0", "123"))?;
                txn.put_interface(&test_interface("n2", "eth0", "777"))?;
                seed_placement(txn, "n1", &["123"])?;
                seed_placement(txn, "n2", &["777"])
            })
            .unwrap();

        assert!(store.transact(|txn| txn.delete_node("n1")).unwrap());

        assert!(store.get_node("n1").unwrap().is_none());
        assert!(store.list_interfaces("n1").unwrap().is_empty());
        assert!(store.list_allowed("n1").unwrap().is_empty());
        assert!(store.list_assignments("n1").unwrap().is_empty());
        assert_eq!(store.list_interfaces("n2").unwrap().len(), 1);
        assert_eq!(store.list_assignments("n2").unwrap().len(), 2);
    }

    // ── Placement ──────────────────────────────────────────────────

    #[test]
    fn clear_placement_removes_only_that_node() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                seed_placement(txn, "n1", &["123", "654"])?;
                seed_placement(txn, "n10", &["aaa"])
            })
            .unwrap();

        let cleared = store.transact(|txn| txn.clear_placement("n1")).unwrap();

        assert_eq!(
            cleared,
            ClearedRows {
                allowed: 2,
                assignments: 2
            }
        );
        assert!(store.list_allowed("n1").unwrap().is_empty());
        assert!(store.list_assignments("n1").unwrap().is_empty());
        assert_eq!(store.list_allowed("n10").unwrap().len(), 1);
        assert_eq!(store.list_assignments("n10").unwrap().len(), 2);
    }

    #[test]
    fn failed_transaction_rolls_back_every_write() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| {
                txn.put_node(&test_node("n1", Some("c1")))?;
                txn.put_node(&test_node("n2", Some("c1")))?;
                seed_placement(txn, "n1", &["123"])?;
                seed_placement(txn, "n2", &["456"])
            })
            .unwrap();

        let result: Result<(), StateError> = store.transact(|txn| {
            txn.clear_placement("n1")?;
            txn.put_node(&test_node("n1", None))?;
            // Fail half-way through the cascade.
            Err(StateError::Write("disk full".to_string()))
        });

        assert!(matches!(result, Err(StateError::Write(_))));
        assert_eq!(store.list_assignments("n1").unwrap().len(), 2);
        assert_eq!(store.list_allowed("n1").unwrap().len(), 1);
        assert_eq!(
            store.get_node("n1").unwrap().unwrap().cluster_id.as_deref(),
            Some("c1")
        );
    }

    #[test]
    fn snapshot_does_not_see_later_commits() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .transact(|txn| seed_placement(txn, "n1", &["123"]))
            .unwrap();

        let before = store.snapshot().unwrap();
        store.transact(|txn| txn.clear_placement("n1")).unwrap();

        assert_eq!(before.list_assignments("n1").unwrap().len(), 2);
        assert!(store.list_assignments("n1").unwrap().is_empty());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store
                .transact(|txn| txn.put_cluster(&test_cluster("prod")))
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let cluster = store.get_cluster("prod").unwrap();
        assert_eq!(cluster.unwrap().segmentation, SegmentationPolicy::Vlan);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_clusters().unwrap().is_empty());
        assert!(store.list_nodes().unwrap().is_empty());
        assert!(store.list_interfaces("any").unwrap().is_empty());
        assert!(store.list_assignments("any").unwrap().is_empty());
        let cleared = store.transact(|txn| txn.clear_placement("any")).unwrap();
        assert_eq!(cleared, ClearedRows::default());
        assert!(!store.transact(|txn| txn.delete_node("nope")).unwrap());
        assert!(!store.transact(|txn| txn.delete_cluster("nope")).unwrap());
    }
}
