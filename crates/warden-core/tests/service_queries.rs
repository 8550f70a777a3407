//! Query and mutation surface of the permission service

use std::collections::{BTreeSet, HashSet};

use warden_test_fixtures::{cm, user, TestFixture};
use warden_types::{AccessPermission, AccessStatus, NodePermissionEntry, PermissionEntry};

fn names(permissions: &[AccessPermission]) -> HashSet<(String, AccessStatus, String)> {
    permissions
        .iter()
        .map(|p| (p.permission.clone(), p.access, p.authority.clone()))
        .collect()
}

fn set(items: &[(&str, AccessStatus, &str)]) -> HashSet<(String, AccessStatus, String)> {
    items
        .iter()
        .map(|(p, a, auth)| (p.to_string(), *a, auth.to_string()))
        .collect()
}

#[test]
fn test_settable_permissions() {
    let fixture = TestFixture::new();
    let doc = fixture.content(&fixture.root);

    let settable = fixture.service.get_settable_permissions(&doc).unwrap();
    for expected in ["Read", "Write", "Delete", "Consumer", "Coordinator", "ChangePermissions"] {
        assert!(settable.contains(expected), "{expected} should be settable");
    }
    for hidden in ["_ReadProperties", "ReadProperties", "TakeOwnership", "All"] {
        assert!(!settable.contains(hidden), "{hidden} should not be settable");
    }

    fixture.backend.add_aspect(&doc, cm("ownable")).unwrap();
    let settable = fixture.service.get_settable_permissions(&doc).unwrap();
    assert!(settable.contains("TakeOwnership"));

    let for_type = fixture.service.get_settable_permissions_for_type(&cm("content"));
    assert!(for_type.contains("Read"));
    assert!(!for_type.contains("TakeOwnership"));
}

#[test]
fn test_get_permissions_reports_the_principal_status() {
    let fixture = TestFixture::new();
    fixture.grant(&fixture.root, "alice", "Consumer");

    let permissions = fixture
        .service
        .get_permissions(&user("alice"), &fixture.root)
        .unwrap();
    let status = |name: &str| {
        permissions
            .iter()
            .find(|p| p.permission == name)
            .map(|p| (p.access, p.authority.clone()))
    };

    assert_eq!(status("Read"), Some((AccessStatus::Allowed, "alice".to_string())));
    assert_eq!(status("Consumer"), Some((AccessStatus::Allowed, "alice".to_string())));
    assert_eq!(status("Write"), Some((AccessStatus::Denied, "alice".to_string())));
    assert_eq!(status("_ReadProperties"), None);
}

#[test]
fn test_set_permissions_are_reported() {
    let fixture = TestFixture::new();
    fixture.grant(&fixture.root, "alice", "Read");
    fixture.deny(&fixture.root, "bob", "Write");

    let reported = fixture.service.get_all_set_permissions(&fixture.root).unwrap();
    assert_eq!(
        names(&reported),
        set(&[
            ("Read", AccessStatus::Allowed, "alice"),
            ("Write", AccessStatus::Denied, "bob"),
        ])
    );

    let doc = fixture.content(&fixture.root);
    assert!(fixture.service.get_all_set_permissions(&doc).unwrap().is_empty());
    assert!(fixture.service.get_set_permissions(&doc).unwrap().is_none());

    let entry = fixture
        .service
        .get_set_permissions(&fixture.root)
        .unwrap()
        .unwrap();
    assert_eq!(entry.entries.len(), 2);
    assert!(entry.inherit_parent_permissions);
}

#[test]
fn test_delete_and_clear_permissions() {
    let fixture = TestFixture::new();
    let root = &fixture.root;
    fixture.grant(root, "alice", "Read");
    fixture.deny(root, "alice", "Read");
    fixture.grant(root, "alice", "Write");
    fixture.grant(root, "bob", "Read");

    fixture.service.delete_permission(root, "alice", "Read").unwrap();
    assert_eq!(
        names(&fixture.service.get_all_set_permissions(root).unwrap()),
        set(&[
            ("Write", AccessStatus::Allowed, "alice"),
            ("Read", AccessStatus::Allowed, "bob"),
        ])
    );

    fixture.service.clear_permission(root, "alice").unwrap();
    assert_eq!(
        names(&fixture.service.get_all_set_permissions(root).unwrap()),
        set(&[("Read", AccessStatus::Allowed, "bob")])
    );

    fixture.service.delete_permissions(root).unwrap();
    assert!(fixture.service.get_all_set_permissions(root).unwrap().is_empty());
    fixture.assert_denied("bob", root, "Read");
}

#[test]
fn test_delete_permissions_for_authority() {
    let fixture = TestFixture::new();
    let folder = fixture.folder(&fixture.root);
    fixture.grant(&fixture.root, "alice", "Read");
    fixture.grant(&folder, "alice", "Write");
    fixture.grant(&folder, "bob", "Read");
    fixture
        .service
        .set_store_permission(&fixture.store, "alice", "Read", true)
        .unwrap();

    fixture.service.delete_permissions_for_authority("alice").unwrap();

    fixture.assert_denied("alice", &folder, "Read");
    fixture.assert_allowed("bob", &folder, "Read");
    assert!(fixture
        .service
        .all_set_permissions_for_authority("alice")
        .unwrap()
        .is_empty());
    assert!(fixture
        .service
        .get_all_set_store_permissions(&fixture.store)
        .unwrap()
        .is_empty());
}

#[test]
fn test_set_node_permission_entry_replaces_everything() {
    let fixture = TestFixture::new();
    let folder = fixture.folder(&fixture.root);
    fixture.grant(&fixture.root, "alice", "Read");
    fixture.grant(&folder, "bob", "Read");

    let write = fixture.service.permission_reference("Write").unwrap();
    fixture
        .service
        .set_node_permission_entry(NodePermissionEntry::new(
            folder.clone(),
            vec![PermissionEntry::new("carol", write, AccessStatus::Allowed)],
            false,
        ))
        .unwrap();

    assert!(!fixture.service.inherit_parent_permissions(&folder).unwrap());
    fixture.assert_denied("alice", &folder, "Read");
    fixture.assert_denied("bob", &folder, "Read");
    assert_eq!(
        names(&fixture.service.get_all_set_permissions(&folder).unwrap()),
        set(&[("Write", AccessStatus::Allowed, "carol")])
    );
}

#[test]
fn test_find_nodes_by_assigned_permission() {
    let fixture = TestFixture::new();
    fixture.resolver.add_membership("alice", "GROUP_team");
    let direct = fixture.folder(&fixture.root);
    let via_group = fixture.folder(&fixture.root);
    let via_aggregate = fixture.content(&fixture.root);
    let denied = fixture.content(&fixture.root);

    fixture.grant(&direct, "alice", "Read");
    fixture.grant(&via_group, "GROUP_team", "Read");
    fixture.grant(&via_aggregate, "alice", "Consumer");
    fixture.deny(&denied, "alice", "Read");

    let service = &fixture.service;
    assert_eq!(
        service
            .find_nodes_by_assigned_permission("alice", "Read", true, false, false)
            .unwrap(),
        BTreeSet::from([direct.clone()])
    );
    assert_eq!(
        service
            .find_nodes_by_assigned_permission("alice", "Read", true, true, false)
            .unwrap(),
        BTreeSet::from([direct.clone(), via_group.clone()])
    );
    assert_eq!(
        service
            .find_nodes_by_assigned_permission("alice", "Read", true, false, true)
            .unwrap(),
        BTreeSet::from([direct.clone(), via_aggregate.clone()])
    );
    assert_eq!(
        service
            .find_nodes_by_assigned_permission("alice", "Read", true, true, true)
            .unwrap(),
        BTreeSet::from([direct, via_group, via_aggregate])
    );
    assert_eq!(
        service
            .find_nodes_by_assigned_permission("alice", "Read", false, false, false)
            .unwrap(),
        BTreeSet::from([denied])
    );
    assert!(service
        .find_nodes_by_assigned_permission("alice", "Teleport", true, false, false)
        .is_err());
}

#[test]
fn test_all_set_permissions_for_authority() {
    let fixture = TestFixture::new();
    let folder = fixture.folder(&fixture.root);
    fixture.grant(&fixture.root, "alice", "Read");
    fixture.grant(&folder, "alice", "Write");
    fixture.deny(&folder, "alice", "Delete");
    fixture.grant(&folder, "bob", "Read");

    let by_node = fixture
        .service
        .all_set_permissions_for_authority("alice")
        .unwrap();

    assert_eq!(by_node.len(), 2);
    assert_eq!(
        names(&by_node[&fixture.root]),
        set(&[("Read", AccessStatus::Allowed, "alice")])
    );
    assert_eq!(
        names(&by_node[&folder]),
        set(&[
            ("Write", AccessStatus::Allowed, "alice"),
            ("Delete", AccessStatus::Denied, "alice"),
        ])
    );
}

#[test]
fn test_store_permissions() {
    let fixture = TestFixture::new();
    let service = &fixture.service;
    let store = &fixture.store;

    service.set_store_permission(store, "alice", "Read", true).unwrap();
    service.set_store_permission(store, "alice", "Write", false).unwrap();
    service.set_store_permission(store, "bob", "Read", true).unwrap();
    assert_eq!(
        names(&service.get_all_set_store_permissions(store).unwrap()),
        set(&[
            ("Read", AccessStatus::Allowed, "alice"),
            ("Write", AccessStatus::Denied, "alice"),
            ("Read", AccessStatus::Allowed, "bob"),
        ])
    );

    service.delete_store_permission(store, "alice", "Write").unwrap();
    service.clear_store_permission(store, "bob").unwrap();
    assert_eq!(
        names(&service.get_all_set_store_permissions(store).unwrap()),
        set(&[("Read", AccessStatus::Allowed, "alice")])
    );

    service.delete_store_permissions(store).unwrap();
    assert!(service.get_all_set_store_permissions(store).unwrap().is_empty());
}

#[test]
fn test_every_mutation_clears_the_cache() {
    let fixture = TestFixture::new();
    let service = &fixture.service;
    let root = &fixture.root;
    let store = &fixture.store;
    let before = service.cache_stats().unwrap().invalidations;

    service.set_permission(root, "alice", "Read", true).unwrap();
    service.delete_permission(root, "alice", "Read").unwrap();
    service.clear_permission(root, "alice").unwrap();
    service.delete_permissions(root).unwrap();
    service.delete_permissions_for_authority("alice").unwrap();
    service.set_inherit_parent_permissions(root, true).unwrap();
    service
        .set_node_permission_entry(NodePermissionEntry::new(root.clone(), Vec::new(), true))
        .unwrap();
    service.set_store_permission(store, "alice", "Read", true).unwrap();
    service.delete_store_permission(store, "alice", "Read").unwrap();
    service.clear_store_permission(store, "alice").unwrap();
    service.delete_store_permissions(store).unwrap();
    service
        .set_access_control_list(warden_types::AccessControlList::new(
            warden_types::AclId(7),
            Vec::new(),
        ))
        .unwrap();

    assert_eq!(service.cache_stats().unwrap().invalidations, before + 12);
}

#[test]
fn test_uncached_service_reports_no_stats() {
    let fixture = TestFixture::with_cache(None);
    fixture.grant(&fixture.root, "alice", "Read");

    fixture.assert_allowed("alice", &fixture.root, "Read");
    assert!(fixture.service.cache_stats().is_none());
}

#[test]
fn test_permission_references_are_interned() {
    let fixture = TestFixture::new();
    let first = fixture.service.permission_reference("Read").unwrap();
    let second = fixture.service.permission_reference("Read").unwrap();

    assert!(first.is_same(&second));
    assert!(fixture.service.permission_reference("Teleport").is_none());
    assert_eq!(fixture.service.all_permission(), "All");
    assert!(fixture
        .service
        .permission_reference("All")
        .unwrap()
        .is_same(&fixture.service.all_permission_reference()));
}
