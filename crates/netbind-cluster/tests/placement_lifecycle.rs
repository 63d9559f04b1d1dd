//! Placement lifecycle tests.
//!
//! Drives the coordinator through registration, attach, meta refresh and
//! detach against an in-memory store and checks the stored placement.

use std::collections::BTreeMap;

use netbind_cluster::*;
use netbind_core::{ClusterConfig, SegmentationPolicy};
use netbind_placement::{ElectionBasis, RawInterface, RawMeta};
use netbind_state::StateStore;

fn coordinator() -> LifecycleCoordinator {
    LifecycleCoordinator::new(StateStore::open_in_memory().unwrap())
}

fn meta(entries: &[(&str, &str, Option<&str>)]) -> RawMeta {
    RawMeta::with_interfaces(
        entries
            .iter()
            .map(|(name, mac, ip)| RawInterface::new(name, mac, *ip))
            .collect(),
    )
}

fn with_cluster(policy: SegmentationPolicy) -> LifecycleCoordinator {
    let coordinator = coordinator();
    coordinator
        .create_cluster(&ClusterConfig::new("c1", policy), &[])
        .unwrap();
    coordinator
}

fn nic<'a>(nics: &'a [NicView], mac: &str) -> &'a NicView {
    nics.iter().find(|n| n.mac == mac).unwrap()
}

fn assigned(nics: &[NicView], mac: &str) -> Vec<String> {
    nic(nics, mac)
        .assigned_networks
        .iter()
        .map(|n| n.name.clone())
        .collect()
}

#[test]
fn primary_interface_carries_only_admin() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register("node-1", "123", &meta(&[("eth0", "123", None), ("eth1", "654", None)]), None)
        .unwrap();
    coordinator.attach("node-1", "c1").unwrap();

    let nics = coordinator.nics("node-1").unwrap();
    assert_eq!(assigned(&nics, "123"), ["admin"]);
    assert!(!assigned(&nics, "654").is_empty());
    assert!(!assigned(&nics, "654").contains(&"admin".to_string()));
    assert!(nics.iter().all(|n| !n.allowed_networks.is_empty()));
}

#[test]
fn clearing_membership_empties_both_sets() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", None)]),
            Some("c1"),
        )
        .unwrap();

    let node = coordinator
        .update_node(&NodeUpdate {
            id: "node-1".into(),
            membership: Membership::Leave,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(node.cluster_id, None);

    let nics = coordinator.nics("node-1").unwrap();
    assert_eq!(nics.len(), 2);
    for nic in &nics {
        assert!(nic.assigned_networks.is_empty());
        assert!(nic.allowed_networks.is_empty());
    }
    let state = coordinator.state();
    assert!(state.list_assignments("node-1").unwrap().is_empty());
    assert!(state.list_allowed("node-1").unwrap().is_empty());
}

#[test]
fn admin_follows_address_and_public_takes_next_interface() {
    for policy in [
        SegmentationPolicy::Flat,
        SegmentationPolicy::Vlan,
        SegmentationPolicy::Tunnel,
    ] {
        let coordinator = with_cluster(policy);
        coordinator
            .register(
                "node-1",
                "999",
                &meta(&[("eth1", "111", None), ("eth0", "222", Some("10.20.0.2"))]),
                Some("c1"),
            )
            .unwrap();

        let nics = coordinator.nics("node-1").unwrap();
        assert!(assigned(&nics, "222").contains(&"admin".to_string()), "{policy}");
        assert!(assigned(&nics, "111").contains(&"public".to_string()), "{policy}");

        let election = coordinator.admin_interface("node-1").unwrap();
        assert_eq!(election.name, "eth0");
        assert_eq!(election.basis, ElectionBasis::AddressMatch);
    }
}

#[test]
fn admin_moves_with_address_and_reverts_on_detach() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", Some("10.20.0.3"))]),
            Some("c1"),
        )
        .unwrap();
    assert!(assigned(&coordinator.nics("node-1").unwrap(), "654").contains(&"admin".to_string()));

    let outcome = coordinator
        .update_meta(
            "node-1",
            &meta(&[("eth0", "123", Some("10.20.0.3")), ("eth1", "654", None)]),
        )
        .unwrap();
    assert_eq!(outcome, MetaOutcome::Reelected);

    let nics = coordinator.nics("node-1").unwrap();
    assert!(assigned(&nics, "123").contains(&"admin".to_string()));
    assert!(!assigned(&nics, "654").contains(&"admin".to_string()));

    assert!(coordinator.detach("node-1").unwrap());
    let election = coordinator.admin_interface("node-1").unwrap();
    assert_eq!(election.mac, "123");
    assert!(coordinator.nics("node-1").unwrap().iter().all(|n| n.assigned_networks.is_empty()));
}

#[test]
fn detached_admin_falls_back_to_primary_without_address() {
    let coordinator = coordinator();
    coordinator
        .register("node-1", "654", &meta(&[("eth0", "123", None), ("eth1", "654", None)]), None)
        .unwrap();

    let election = coordinator.admin_interface("node-1").unwrap();
    assert_eq!(election.mac, "654");
    assert_eq!(election.basis, ElectionBasis::PrimaryAddress);
}

#[test]
fn every_group_assigned_exactly_once_to_an_allowed_interface() {
    let coordinator = with_cluster(SegmentationPolicy::Tunnel);
    coordinator
        .register(
            "node-1",
            "bb",
            &meta(&[("eth2", "cc", None), ("eth0", "aa", None), ("eth1", "bb", None)]),
            Some("c1"),
        )
        .unwrap();

    let state = coordinator.state();
    let groups = state.list_groups("c1").unwrap();
    let rows = state.list_assignments("node-1").unwrap();
    assert_eq!(rows.len(), groups.len());

    let allowed = state.list_allowed("node-1").unwrap();
    for row in &rows {
        let permitted = allowed.iter().find(|a| a.mac == row.mac).unwrap();
        assert!(permitted.groups.contains(&row.group_id));
    }
}

#[test]
fn reattaching_is_idempotent() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    let raw = meta(&[("eth0", "123", None), ("eth1", "654", None), ("eth2", "777", None)]);
    coordinator.register("node-1", "123", &raw, Some("c1")).unwrap();
    let first = coordinator.nics("node-1").unwrap();

    coordinator.attach("node-1", "c1").unwrap();
    assert_eq!(coordinator.nics("node-1").unwrap(), first);
    assert_eq!(coordinator.update_meta("node-1", &raw).unwrap(), MetaOutcome::Unchanged);
    assert_eq!(coordinator.nics("node-1").unwrap(), first);
}

#[test]
fn added_interface_triggers_full_recompute() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register("node-1", "123", &meta(&[("eth0", "123", None)]), Some("c1"))
        .unwrap();
    assert_eq!(assigned(&coordinator.nics("node-1").unwrap(), "123").len(), 5);

    let outcome = coordinator
        .update_meta("node-1", &meta(&[("eth0", "123", None), ("eth1", "654", None)]))
        .unwrap();
    assert_eq!(outcome, MetaOutcome::Recomputed);

    let nics = coordinator.nics("node-1").unwrap();
    assert_eq!(assigned(&nics, "123"), ["admin"]);
    assert_eq!(assigned(&nics, "654").len(), 4);
}

#[test]
fn removed_interface_drops_its_rows() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", None)]),
            Some("c1"),
        )
        .unwrap();

    coordinator
        .update_meta("node-1", &meta(&[("eth0", "123", None)]))
        .unwrap();

    let state = coordinator.state();
    assert_eq!(state.list_interfaces("node-1").unwrap().len(), 1);
    assert!(state.list_allowed("node-1").unwrap().iter().all(|a| a.mac == "123"));
    assert!(state.list_assignments("node-1").unwrap().iter().all(|a| a.mac == "123"));
}

#[test]
fn detached_meta_update_only_stores_interfaces() {
    let coordinator = coordinator();
    coordinator
        .register("node-1", "123", &meta(&[("eth0", "123", None)]), None)
        .unwrap();

    let outcome = coordinator
        .update_meta("node-1", &meta(&[("eth0", "123", None), ("eth1", "654", None)]))
        .unwrap();
    assert_eq!(outcome, MetaOutcome::Stored);
    assert_eq!(coordinator.interfaces("node-1").unwrap().len(), 2);
    assert!(coordinator.state().list_assignments("node-1").unwrap().is_empty());
}

#[test]
fn override_places_network_on_named_interface() {
    let coordinator = coordinator();
    let mut config = ClusterConfig::new("c1", SegmentationPolicy::Vlan);
    config.overrides.insert("storage".into(), "eth2".into());
    coordinator.create_cluster(&config, &[]).unwrap();
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", None), ("eth2", "777", None)]),
            Some("c1"),
        )
        .unwrap();

    assert_eq!(assigned(&coordinator.nics("node-1").unwrap(), "777"), ["storage"]);
}

#[test]
fn moving_between_clusters_replaces_rows() {
    let coordinator = coordinator();
    coordinator
        .create_cluster(&ClusterConfig::new("c1", SegmentationPolicy::Vlan), &[])
        .unwrap();
    coordinator
        .create_cluster(&ClusterConfig::new("c2", SegmentationPolicy::Flat), &[])
        .unwrap();
    coordinator
        .register("node-1", "123", &meta(&[("eth0", "123", None)]), Some("c1"))
        .unwrap();

    coordinator.attach("node-1", "c2").unwrap();

    let rows = coordinator.state().list_assignments("node-1").unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.group_id.starts_with("c2/")));
    let allowed = coordinator.state().list_allowed("node-1").unwrap();
    assert!(allowed[0].groups.iter().all(|g| g.starts_with("c2/")));
}

#[test]
fn reassign_rejects_incomplete_or_unknown_targets() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", None)]),
            Some("c1"),
        )
        .unwrap();
    let before = coordinator.nics("node-1").unwrap();

    let mut placements = BTreeMap::new();
    placements.insert("admin".to_string(), "eth1".to_string());
    let err = coordinator.reassign("node-1", &placements).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    for name in ["public", "management", "storage", "private"] {
        placements.insert(name.to_string(), "eth9".to_string());
    }
    assert!(coordinator.reassign("node-1", &placements).is_err());
    assert_eq!(coordinator.nics("node-1").unwrap(), before);

    for name in ["public", "management", "storage", "private"] {
        placements.insert(name.to_string(), "eth0".to_string());
    }
    coordinator.reassign("node-1", &placements).unwrap();
    let nics = coordinator.nics("node-1").unwrap();
    assert_eq!(assigned(&nics, "654"), ["admin"]);
    assert_eq!(assigned(&nics, "123").len(), 4);
}

#[test]
fn invalid_meta_rejected_before_any_change() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register("node-1", "123", &meta(&[("eth0", "123", None)]), Some("c1"))
        .unwrap();
    let before = coordinator.nics("node-1").unwrap();

    let err = coordinator
        .update_meta("node-1", &meta(&[("eth0", "123", None), ("eth1", "123", None)]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(coordinator.update_meta("node-1", &RawMeta::default()).is_err());
    assert_eq!(coordinator.nics("node-1").unwrap(), before);
}

#[test]
fn registration_validates_input() {
    let coordinator = with_cluster(SegmentationPolicy::Flat);
    let raw = meta(&[("eth0", "123", None)]);

    assert!(matches!(
        coordinator.register("a:b", "123", &raw, None),
        Err(LifecycleError::InvalidId(_))
    ));
    coordinator.register("node-1", "123", &raw, None).unwrap();
    assert!(matches!(
        coordinator.register("node-1", "123", &raw, None),
        Err(LifecycleError::DuplicateNode(_))
    ));
    assert!(matches!(
        coordinator.register("node-2", "123", &raw, Some("missing")),
        Err(LifecycleError::ClusterNotFound(_))
    ));
    assert!(coordinator.state().get_node("node-2").unwrap().is_none());
    assert!(matches!(
        coordinator.attach("ghost", "c1"),
        Err(LifecycleError::NodeNotFound(_))
    ));
}

#[test]
fn joining_current_cluster_keeps_reelected_placement() {
    let registered = meta(&[("eth0", "123", None), ("eth1", "654", Some("10.20.0.3"))]);
    let moved = meta(&[("eth0", "123", Some("10.20.0.3")), ("eth1", "654", None)]);

    let by_meta = with_cluster(SegmentationPolicy::Vlan);
    by_meta.register("node-1", "123", &registered, Some("c1")).unwrap();
    by_meta.update_meta("node-1", &moved).unwrap();

    let by_update = with_cluster(SegmentationPolicy::Vlan);
    by_update.register("node-1", "123", &registered, Some("c1")).unwrap();
    by_update
        .update_node(&NodeUpdate {
            id: "node-1".into(),
            meta: Some(moved),
            membership: Membership::Join("c1".into()),
        })
        .unwrap();

    let expected = by_meta.nics("node-1").unwrap();
    assert_eq!(assigned(&expected, "123").len(), 5);
    assert_eq!(by_update.nics("node-1").unwrap(), expected);
}

#[test]
fn joining_current_cluster_keeps_manual_assignment() {
    let coordinator = with_cluster(SegmentationPolicy::Vlan);
    coordinator
        .register(
            "node-1",
            "123",
            &meta(&[("eth0", "123", None), ("eth1", "654", None)]),
            Some("c1"),
        )
        .unwrap();

    let placements: BTreeMap<String, String> = ["admin", "public", "management", "storage", "private"]
        .into_iter()
        .map(|name| (name.to_string(), "eth1".to_string()))
        .collect();
    coordinator.reassign("node-1", &placements).unwrap();
    let manual = coordinator.nics("node-1").unwrap();

    coordinator
        .update_node(&NodeUpdate {
            id: "node-1".into(),
            membership: Membership::Join("c1".into()),
            ..Default::default()
        })
        .unwrap();
    coordinator.attach("node-1", "c1").unwrap();

    assert_eq!(coordinator.nics("node-1").unwrap(), manual);
    assert_eq!(assigned(&manual, "654").len(), 5);
}
