//! Helper utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use warden_core::SecurityContext;
use warden_model::DeclarativeModel;
use warden_test_fixtures::TestFixture;
use warden_types::{AccessStatus, NodeRef};

/// A fixture over a small model written inline by the test.
///
/// The model must declare `cm:folder` in the fixture's content namespace.
pub fn fixture_with(json: &str) -> TestFixture {
    let model = DeclarativeModel::from_json(json).expect("inline model builds");
    TestFixture::with_model(Arc::new(model), Some(Arc::new(Default::default())))
}

/// Namespaces and classes every inline model starts from
pub const INLINE_HEADER: &str = r#"
    "namespaces": {
        "sys": "http://www.alfresco.org/model/system/1.0",
        "cm": "http://www.alfresco.org/model/content/1.0"
    },
    "classes": [
        { "name": "sys:base" },
        { "name": "cm:folder", "parent": "sys:base" }
    ]
"#;

pub fn inline_model(permission_sets: &str) -> String {
    format!("{{ {INLINE_HEADER}, \"permission_sets\": {permission_sets} }}")
}

pub fn check_as(
    fixture: &TestFixture,
    ctx: &SecurityContext,
    node: &NodeRef,
    permission: &str,
) -> AccessStatus {
    fixture
        .service
        .has_permission(ctx, Some(node), Some(permission))
        .expect("check")
}
