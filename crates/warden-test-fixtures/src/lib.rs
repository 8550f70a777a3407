//! Test fixtures for Warden integration tests
//!
//! A content-repository style permission model, an in-memory node graph
//! with a store root, and a service wired with the owner dynamic
//! authority.

pub mod proptest_config;

use std::collections::BTreeMap;
use std::sync::Arc;

use warden_cache::AccessCache;
use warden_core::{InMemoryAuthorityResolver, OwnerDynamicAuthority, PermissionService, SecurityContext};
use warden_model::{DeclarativeModel, ModelDefinition};
use warden_store::MemoryBackend;
use warden_types::{AccessStatus, NodeRef, QName, StoreRef};

/// Permission model shared by the integration suites
pub const MODEL_JSON: &str = include_str!("model.json");

pub const SYS_URI: &str = "http://www.alfresco.org/model/system/1.0";
pub const CM_URI: &str = "http://www.alfresco.org/model/content/1.0";

pub fn cm(local: &str) -> QName {
    QName::new(CM_URI, local)
}

pub fn sys(local: &str) -> QName {
    QName::new(SYS_URI, local)
}

pub fn definition() -> ModelDefinition {
    ModelDefinition::from_json(MODEL_JSON).expect("fixture model parses")
}

pub fn namespaces() -> BTreeMap<String, String> {
    definition().namespaces
}

pub fn model() -> Arc<DeclarativeModel> {
    Arc::new(DeclarativeModel::from_definition(&definition()).expect("fixture model builds"))
}

/// Context for a plain authenticated user
pub fn user(name: &str) -> SecurityContext {
    SecurityContext::user(name)
}

/// Test fixture for setting up a complete evaluation environment
pub struct TestFixture {
    pub backend: Arc<MemoryBackend>,
    pub resolver: Arc<InMemoryAuthorityResolver>,
    pub model: Arc<DeclarativeModel>,
    pub service: Arc<PermissionService>,
    pub store: StoreRef,
    pub root: NodeRef,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_cache(Some(Arc::new(AccessCache::default())))
    }

    pub fn with_cache(cache: Option<Arc<AccessCache>>) -> Self {
        Self::with_model(model(), cache)
    }

    /// Build against another model; the store root is a `cm:folder`
    pub fn with_model(model: Arc<DeclarativeModel>, cache: Option<Arc<AccessCache>>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let resolver = Arc::new(InMemoryAuthorityResolver::new());
        let service = PermissionService::new_with_cache(
            backend.clone(),
            backend.clone(),
            model.clone(),
            resolver.clone(),
            cache,
        )
        .with_dynamic_authority(Arc::new(OwnerDynamicAuthority::new(backend.clone())));

        let store = StoreRef::new("workspace", "SpacesStore");
        let root = backend
            .create_root(store.clone(), cm("folder"))
            .expect("fixture root");

        Self {
            backend,
            resolver,
            model,
            service: Arc::new(service),
            store,
            root,
        }
    }

    pub fn folder(&self, parent: &NodeRef) -> NodeRef {
        self.backend
            .create_node(parent, cm("folder"))
            .expect("create folder")
    }

    pub fn content(&self, parent: &NodeRef) -> NodeRef {
        self.backend
            .create_node(parent, cm("content"))
            .expect("create content")
    }

    pub fn grant(&self, node: &NodeRef, authority: &str, permission: &str) {
        self.service
            .set_permission(node, authority, permission, true)
            .expect("grant");
    }

    pub fn deny(&self, node: &NodeRef, authority: &str, permission: &str) {
        self.service
            .set_permission(node, authority, permission, false)
            .expect("deny");
    }

    /// Perform a check as `username`
    pub fn check(&self, username: &str, node: &NodeRef, permission: &str) -> AccessStatus {
        self.service
            .has_permission(&user(username), Some(node), Some(permission))
            .expect("check")
    }

    /// Assert that a check returns ALLOWED
    pub fn assert_allowed(&self, username: &str, node: &NodeRef, permission: &str) {
        assert_eq!(
            self.check(username, node, permission),
            AccessStatus::Allowed,
            "{} should be allowed {} on {}",
            username,
            permission,
            node
        );
    }

    /// Assert that a check returns DENIED
    pub fn assert_denied(&self, username: &str, node: &NodeRef, permission: &str) {
        assert_eq!(
            self.check(username, node, permission),
            AccessStatus::Denied,
            "{} should be denied {} on {}",
            username,
            permission,
            node
        );
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
