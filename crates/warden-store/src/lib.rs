//! # Warden Store - Storage Abstraction Layer
//!
//! Interfaces to the node graph and to persisted permission entries, as
//! consumed by the permission engine. Both are synchronous: evaluation is
//! a quick in-process decision and never suspends.

use std::collections::{BTreeMap, BTreeSet};

use warden_types::{
    AccessControlList, AclId, ChildAssociation, NodePermissionEntry, NodeRef, PermissionEntry,
    PermissionReference, QName, StoreRef, StoreResult,
};

pub mod memory;

pub use memory::MemoryBackend;

type Result<T> = StoreResult<T>;

/// Read access to the node graph
pub trait NodeStore: Send + Sync {
    /// Whether the node currently exists
    fn exists(&self, node: &NodeRef) -> Result<bool>;

    /// The node's type
    fn node_type(&self, node: &NodeRef) -> Result<QName>;

    /// The aspects applied to the node
    fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>>;

    /// The primary parent association, `None` for a store root
    fn primary_parent(&self, node: &NodeRef) -> Result<Option<ChildAssociation>>;

    /// Every child association where the node is the parent
    fn child_associations(&self, node: &NodeRef) -> Result<Vec<ChildAssociation>>;

    /// The root node of a store
    fn root_node(&self, store: &StoreRef) -> Result<NodeRef>;

    /// The owner of a node, if ownership is tracked
    fn owner(&self, _node: &NodeRef) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Persisted node entries, store entries and access control lists
///
/// Mutations are applied immediately; callers that cache decisions must
/// invalidate on every mutation path.
pub trait PermissionStore: Send + Sync {
    /// Entries set directly on a node, `None` if nothing was ever set
    fn permissions(&self, node: &NodeRef) -> Result<Option<NodePermissionEntry>>;

    /// Entries set on a store
    fn store_permissions(&self, store: &StoreRef) -> Result<Vec<PermissionEntry>>;

    /// Fetch an access control list by id
    fn access_control_list(&self, id: AclId) -> Result<Option<AccessControlList>>;

    /// Add an entry to a node.
    ///
    /// An existing entry with the same authority, permission and access is
    /// replaced; an entry with the opposite access is kept alongside.
    fn set_permission(&self, node: &NodeRef, entry: PermissionEntry) -> Result<()>;

    /// Remove both allow and deny entries for an authority and permission
    fn delete_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: &PermissionReference,
    ) -> Result<()>;

    /// Remove every entry on the node for one authority
    fn clear_permission(&self, node: &NodeRef, authority: &str) -> Result<()>;

    /// Remove every entry on the node; the inherit flag is left as is
    fn delete_permissions(&self, node: &NodeRef) -> Result<()>;

    /// Remove every entry for an authority, on all nodes and stores
    fn delete_permissions_for_authority(&self, authority: &str) -> Result<()>;

    /// Replace all entries and the inherit flag of a node
    fn set_node_permission_entry(&self, entry: NodePermissionEntry) -> Result<()>;

    fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()>;

    /// Inherit flag of a node; true when never set
    fn inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool>;

    fn set_store_permission(&self, store: &StoreRef, entry: PermissionEntry) -> Result<()>;

    fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &PermissionReference,
    ) -> Result<()>;

    fn clear_store_permission(&self, store: &StoreRef, authority: &str) -> Result<()>;

    fn delete_store_permissions(&self, store: &StoreRef) -> Result<()>;

    /// Create or replace an access control list
    fn set_access_control_list(&self, acl: AccessControlList) -> Result<()>;

    /// Nodes carrying an entry for exactly this authority, permission and access
    fn find_nodes_by_permission(
        &self,
        authority: &str,
        permission: &PermissionReference,
        allow: bool,
    ) -> Result<Vec<NodeRef>>;

    /// Every node entry set for an authority, grouped by node
    fn all_set_permissions(&self, authority: &str)
        -> Result<BTreeMap<NodeRef, Vec<PermissionEntry>>>;
}
