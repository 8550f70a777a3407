//! Permission identities, stored entries and access control lists.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessStatus, NodeRef, QName};

// ============================================================================
// Permission Identity
// ============================================================================

/// The value identifying a permission: its owning type and its name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub qname: QName,
    pub name: String,
}

/// A canonical handle to a permission.
///
/// Instances are normally obtained from an intern table so that equal
/// `(qname, name)` pairs share one allocation. Equality and hashing are
/// by value; [`PermissionReference::is_same`] tests for the shared
/// allocation.
#[derive(Clone)]
pub struct PermissionReference(Arc<PermissionKey>);

impl PermissionReference {
    /// Wrap a key without interning it. Prefer an intern table.
    pub fn from_key(key: PermissionKey) -> Self {
        Self(Arc::new(key))
    }

    pub fn qname(&self) -> &QName {
        &self.0.qname
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn key(&self) -> &PermissionKey {
        &self.0
    }

    /// Reference equality: true when both handles point at the same
    /// interned instance.
    pub fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for PermissionReference {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other) || self.0 == other.0
    }
}

impl Eq for PermissionReference {}

impl Hash for PermissionReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for PermissionReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PermissionReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for PermissionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionReference({}.{})", self.0.qname, self.0.name)
    }
}

impl fmt::Display for PermissionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.qname, self.0.name)
    }
}

impl Serialize for PermissionReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

// ============================================================================
// Stored Entries
// ============================================================================

/// A single grant or denial of a permission to an authority
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PermissionEntry {
    pub authority: String,
    pub permission: PermissionReference,
    pub access: AccessStatus,
}

impl PermissionEntry {
    pub fn new(
        authority: impl Into<String>,
        permission: PermissionReference,
        access: AccessStatus,
    ) -> Self {
        Self {
            authority: authority.into(),
            permission,
            access,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.access.is_allowed()
    }

    pub fn is_denied(&self) -> bool {
        !self.access.is_allowed()
    }
}

/// All entries set directly on one node, plus its inherit flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePermissionEntry {
    pub node: NodeRef,
    pub entries: Vec<PermissionEntry>,
    pub inherit_parent_permissions: bool,
}

impl NodePermissionEntry {
    pub fn new(node: NodeRef, entries: Vec<PermissionEntry>, inherit: bool) -> Self {
        Self {
            node,
            entries,
            inherit_parent_permissions: inherit,
        }
    }
}

// ============================================================================
// Access Control Lists
// ============================================================================

/// Opaque identifier of a pre-flattened access control list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AclId(pub u64);

impl fmt::Display for AclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acl:{}", self.0)
    }
}

/// ACL entries carry the same shape as node entries
pub type AccessControlEntry = PermissionEntry;

/// A flattened list of entries; inheritance is already resolved by the
/// layer that built it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessControlList {
    pub id: AclId,
    pub entries: Vec<AccessControlEntry>,
}

impl AccessControlList {
    pub fn new(id: AclId, entries: Vec<AccessControlEntry>) -> Self {
        Self { id, entries }
    }
}

// ============================================================================
// Requirements
// ============================================================================

/// Where a required permission must additionally hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementScope {
    Node,
    Parent,
    Children,
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// Caller-supplied context for evaluating an ACL outside the node graph
#[derive(Debug, Clone, Default)]
pub struct PermissionContext {
    /// Type of the object the ACL protects; drives requirement lookup
    pub type_qname: Option<QName>,
    pub aspects: BTreeSet<QName>,
    /// Authority -> extra authorities it implies for this evaluation
    pub dynamic_authority_assignment: HashMap<String, BTreeSet<String>>,
    pub additional_context: HashMap<String, serde_json::Value>,
    /// Store-level ACL that must independently grant the permission
    pub store_acl: Option<AclId>,
}

impl PermissionContext {
    pub fn new(type_qname: QName) -> Self {
        Self {
            type_qname: Some(type_qname),
            ..Self::default()
        }
    }

    pub fn with_aspect(mut self, aspect: QName) -> Self {
        self.aspects.insert(aspect);
        self
    }

    pub fn with_store_acl(mut self, acl: AclId) -> Self {
        self.store_acl = Some(acl);
        self
    }

    pub fn assign(mut self, authority: impl Into<String>, implied: impl Into<String>) -> Self {
        self.dynamic_authority_assignment
            .entry(authority.into())
            .or_default()
            .insert(implied.into());
        self
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// A permission setting as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPermission {
    pub permission: String,
    pub access: AccessStatus,
    pub authority: String,
}

impl AccessPermission {
    pub fn new(
        permission: impl Into<String>,
        access: AccessStatus,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            permission: permission.into(),
            access,
            authority: authority.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn key(name: &str) -> PermissionKey {
        PermissionKey {
            qname: QName::new("ns", "base"),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_reference_value_equality() {
        let a = PermissionReference::from_key(key("Read"));
        let b = PermissionReference::from_key(key("Read"));
        assert_eq!(a, b);
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_reference_display() {
        let r = PermissionReference::from_key(key("Write"));
        assert_eq!(r.to_string(), "{ns}base.Write");
        assert_eq!(r.name(), "Write");
    }

    #[test]
    fn test_entry_polarity() {
        let r = PermissionReference::from_key(key("Read"));
        let allow = PermissionEntry::new("bob", r.clone(), AccessStatus::Allowed);
        let deny = PermissionEntry::new("bob", r, AccessStatus::Denied);
        assert!(allow.is_allowed());
        assert!(deny.is_denied());
        assert_ne!(allow, deny);
    }

    #[test]
    fn test_context_builder() {
        let ctx = PermissionContext::new(QName::new("ns", "doc"))
            .with_store_acl(AclId(7))
            .assign("bob", "ROLE_OWNER");
        assert_eq!(ctx.store_acl, Some(AclId(7)));
        assert!(ctx.dynamic_authority_assignment["bob"].contains("ROLE_OWNER"));
    }
}
