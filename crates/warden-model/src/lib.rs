//! # Warden Model - Permission Model
//!
//! The static, read-mostly knowledge base consulted during evaluation:
//! which permissions exist for a type, what they require on the node,
//! its parent and its children, which permissions grant one another and
//! which entries apply globally.

use std::collections::BTreeSet;

use thiserror::Error;
use warden_store::NodeStore;
use warden_types::{
    NodeRef, PermissionEntry, PermissionReference, QName, RequirementScope, StoreResult,
};

pub mod declarative;
pub mod definition;
pub mod intern;

pub use declarative::DeclarativeModel;
pub use definition::{resolve_qname, ModelDefinition};
pub use intern::InternTable;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Unknown namespace prefix: {0}")]
    UnknownPrefix(String),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error("Ambiguous permission name: {0}")]
    AmbiguousPermission(String),

    #[error("Duplicate definition: {0}")]
    Duplicate(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Query surface of the permission model
///
/// Implementations must be safe to share between evaluating threads and
/// must not change while evaluations are in flight.
pub trait PermissionModel: Send + Sync {
    /// Every permission applicable to a type with the given aspects,
    /// including both ALL_PERMISSIONS references
    fn all_permissions(
        &self,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
    ) -> BTreeSet<PermissionReference>;

    /// [`PermissionModel::all_permissions`] for a node's current type and aspects
    fn all_permissions_for_node(
        &self,
        nodes: &dyn NodeStore,
        node: &NodeRef,
    ) -> StoreResult<BTreeSet<PermissionReference>> {
        let type_qname = nodes.node_type(node)?;
        let aspects = nodes.aspects(node)?;
        Ok(self.all_permissions(&type_qname, &aspects))
    }

    /// Permissions that must additionally hold in `scope` for `permission`
    /// to hold; empty when none are declared
    fn required_permissions(
        &self,
        permission: &PermissionReference,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
        scope: RequirementScope,
    ) -> BTreeSet<PermissionReference>;

    /// Permissions whose grant also grants `permission`, including itself
    fn granting_permissions(&self, permission: &PermissionReference)
        -> BTreeSet<PermissionReference>;

    /// Permissions implied by `permission`, including itself
    fn grantee_permissions(&self, permission: &PermissionReference)
        -> BTreeSet<PermissionReference>;

    /// Entries that hold on every node
    fn global_permission_entries(&self) -> &[PermissionEntry];

    /// Whether `permission` is tested directly. Aggregates that grant
    /// atomic permissions are only ever expanded.
    fn check_permission(&self, permission: &PermissionReference) -> bool;

    /// Whether the permission name occurs once across the model
    fn is_unique(&self, permission: &PermissionReference) -> bool;

    /// Permissions offered for setting on a type with the given aspects
    fn exposed_permissions(
        &self,
        type_qname: &QName,
        aspects: &BTreeSet<QName>,
    ) -> BTreeSet<PermissionReference>;

    fn exposed_permissions_for_node(
        &self,
        nodes: &dyn NodeStore,
        node: &NodeRef,
    ) -> StoreResult<BTreeSet<PermissionReference>> {
        let type_qname = nodes.node_type(node)?;
        let aspects = nodes.aspects(node)?;
        Ok(self.exposed_permissions(&type_qname, &aspects))
    }

    /// Resolve a permission. With a type the canonical reference is always
    /// returned; by name alone only a defined, unambiguous name resolves.
    fn permission_reference(&self, qname: Option<&QName>, name: &str)
        -> Option<PermissionReference>;

    /// Display name: the bare name when unique, the qualified form otherwise
    fn permission_name(&self, permission: &PermissionReference) -> String {
        if self.is_unique(permission) {
            permission.name().to_string()
        } else {
            permission.to_string()
        }
    }

    /// Canonical ALL_PERMISSIONS reference
    fn all_permissions_reference(&self) -> PermissionReference;

    /// Legacy alias of ALL_PERMISSIONS with an empty namespace
    fn legacy_all_permissions_reference(&self) -> PermissionReference;
}
