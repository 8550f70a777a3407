//! Requirement expansion on the node, parent and children of a check

mod common;

use common::{fixture_with, inline_model};
use warden_core::EvalError;
use warden_test_fixtures::user;
use warden_types::AccessStatus;

fn node_requirement_model() -> String {
    inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Read" },
                { "name": "Write", "requires": [{ "name": "Read", "on": "node" }] }
            ]
        }]"#,
    )
}

#[test]
fn test_node_requirement_must_hold() {
    let fixture = fixture_with(&node_requirement_model());
    fixture.grant(&fixture.root, "bob", "Read");

    fixture.assert_allowed("bob", &fixture.root, "Read");
    fixture.assert_denied("bob", &fixture.root, "Write");

    fixture.grant(&fixture.root, "alice", "Write");
    fixture.assert_denied("alice", &fixture.root, "Write");

    fixture.grant(&fixture.root, "alice", "Read");
    fixture.assert_allowed("alice", &fixture.root, "Write");
}

#[test]
fn test_parent_requirement_is_checked_on_the_parent() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Browse" },
                { "name": "Edit", "requires": [{ "name": "Browse", "on": "parent" }] }
            ]
        }]"#,
    ));
    let child = fixture.folder(&fixture.root);
    fixture.grant(&child, "alice", "Edit");

    fixture.assert_denied("alice", &child, "Edit");

    fixture.grant(&fixture.root, "alice", "Browse");
    fixture.assert_allowed("alice", &child, "Edit");

    // A store root has no parent to test
    fixture.grant(&fixture.root, "bob", "Edit");
    fixture.assert_allowed("bob", &fixture.root, "Edit");
}

#[test]
fn test_parent_requirement_skipped_without_inheritance() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Browse" },
                { "name": "Edit", "requires": [{ "name": "Browse", "on": "parent" }] }
            ]
        }]"#,
    ));
    let child = fixture.folder(&fixture.root);
    fixture.grant(&child, "alice", "Edit");
    fixture
        .service
        .set_inherit_parent_permissions(&child, false)
        .unwrap();

    fixture.assert_allowed("alice", &child, "Edit");
}

fn traverse_model() -> String {
    inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Traverse", "requires": [{ "name": "Traverse", "on": "parent" }] }
            ]
        }]"#,
    )
}

#[test]
fn test_recursive_requirement_resolves_at_an_ancestor() {
    let fixture = fixture_with(&traverse_model());
    let a = fixture.folder(&fixture.root);
    let b = fixture.folder(&a);

    fixture.assert_denied("alice", &b, "Traverse");

    fixture.grant(&fixture.root, "alice", "Traverse");
    fixture.assert_allowed("alice", &fixture.root, "Traverse");
    fixture.assert_allowed("alice", &a, "Traverse");
    fixture.assert_allowed("alice", &b, "Traverse");
}

#[test]
fn test_recursive_requirement_fails_at_a_non_inheriting_node() {
    let fixture = fixture_with(&traverse_model());
    let a = fixture.folder(&fixture.root);
    let b = fixture.folder(&a);

    fixture.grant(&fixture.root, "alice", "Traverse");
    fixture
        .service
        .set_inherit_parent_permissions(&a, false)
        .unwrap();

    fixture.assert_denied("alice", &a, "Traverse");
    fixture.assert_denied("alice", &b, "Traverse");

    fixture.grant(&a, "alice", "Traverse");
    fixture.assert_allowed("alice", &a, "Traverse");
    fixture.assert_allowed("alice", &b, "Traverse");
}

#[test]
fn test_recursive_requirement_walks_to_the_top_of_the_chain() {
    let fixture = fixture_with(&traverse_model());
    let a = fixture.folder(&fixture.root);
    let b = fixture.folder(&a);

    // Granted midway, but the inherited chain continues to an ungranted root
    fixture.grant(&a, "alice", "Traverse");

    fixture.assert_denied("alice", &fixture.root, "Traverse");
    fixture.assert_denied("alice", &a, "Traverse");
    fixture.assert_denied("alice", &b, "Traverse");
}

#[test]
fn test_children_requirement_checks_every_child() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Purge", "requires": [{ "name": "Purge", "on": "children" }] }
            ]
        }]"#,
    ));
    let first = fixture.folder(&fixture.root);
    let second = fixture.folder(&fixture.root);
    fixture.grant(&fixture.root, "alice", "Purge");

    fixture.assert_allowed("alice", &fixture.root, "Purge");

    fixture.deny(&second, "alice", "Purge");
    fixture.assert_allowed("alice", &first, "Purge");
    fixture.assert_denied("alice", &fixture.root, "Purge");
}

#[test]
fn test_requirement_cycle_is_a_configuration_error() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "Ping", "requires": [{ "name": "Pong", "on": "node" }] },
                { "name": "Pong", "requires": [{ "name": "Ping", "on": "node" }] }
            ]
        }]"#,
    ));
    fixture.grant(&fixture.root, "alice", "Ping");
    fixture.grant(&fixture.root, "alice", "Pong");

    let result = fixture
        .service
        .has_permission(&user("alice"), Some(&fixture.root), Some("Ping"));
    assert!(matches!(result, Err(EvalError::Configuration(_))));
}

#[test]
fn test_cycle_through_children_and_parent_is_a_configuration_error() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "permissions": [
                { "name": "_Down", "requires": [{ "name": "_Up", "on": "children" }] },
                { "name": "_Up", "requires": [{ "name": "_Down", "on": "parent" }] }
            ]
        }]"#,
    ));
    fixture.folder(&fixture.root);
    fixture.grant(&fixture.root, "alice", "_Down");
    fixture.grant(&fixture.root, "alice", "_Up");

    let result = fixture
        .service
        .has_permission(&user("alice"), Some(&fixture.root), Some("_Down"));
    assert!(matches!(result, Err(EvalError::Configuration(_))));
}

#[test]
fn test_group_expands_to_atomic_permissions_of_the_type() {
    let fixture = fixture_with(&inline_model(
        r#"[{
            "type": "sys:base",
            "groups": [
                { "name": "Manage" },
                { "name": "Review" }
            ],
            "permissions": [
                { "name": "_Approve", "granted_to_groups": ["Manage", "Review"] },
                { "name": "_Reject", "granted_to_groups": ["Manage"] }
            ]
        }]"#,
    ));
    let folder = fixture.folder(&fixture.root);

    fixture.grant(&fixture.root, "alice", "Review");
    fixture.assert_allowed("alice", &folder, "Review");
    fixture.assert_allowed("alice", &folder, "_Approve");
    fixture.assert_denied("alice", &folder, "Manage");

    fixture.grant(&fixture.root, "alice", "_Reject");
    assert_eq!(fixture.check("alice", &folder, "Manage"), AccessStatus::Allowed);
}
