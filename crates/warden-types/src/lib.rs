//! # Warden Types
//!
//! Shared type definitions for the Warden permission engine.
//!
//! This crate provides the values that flow between the store, the
//! permission model and the evaluators, ensuring a single source of truth
//! and preventing circular dependencies.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod permission;

pub use permission::{
    AccessControlEntry, AccessControlList, AccessPermission, AclId, NodePermissionEntry,
    PermissionContext, PermissionEntry, PermissionKey, PermissionReference, RequirementScope,
};

// ============================================================================
// Core Domain Types
// ============================================================================

/// A namespace-qualified name, used for node types, aspects and the
/// owning type of a permission
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Parse the `{namespace}local` form produced by `Display`.
    ///
    /// A string without a namespace part yields an empty namespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.strip_prefix('{') {
            Some(rest) => {
                let (namespace, local) = rest.split_once('}')?;
                if local.is_empty() {
                    return None;
                }
                Some(Self::new(namespace, local))
            }
            None if !value.is_empty() && !value.contains('}') => Some(Self::new("", value)),
            None => None,
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

/// Identity of a store (a partition of the node graph)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreRef {
    pub protocol: String,
    pub identifier: String,
}

impl StoreRef {
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

/// Identity of a node within a store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub store: StoreRef,
    pub id: String,
}

impl NodeRef {
    pub fn new(store: StoreRef, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.id)
    }
}

/// A parent/child link between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildAssociation {
    /// `None` for the root node of a store
    pub parent: Option<NodeRef>,
    pub child: NodeRef,
    pub primary: bool,
}

/// The set of authority strings a principal holds for one evaluation.
///
/// Set-backed so that equality and hashing ignore insertion order.
pub type Authorities = BTreeSet<String>;

// ============================================================================
// Decision Types
// ============================================================================

/// The result of a permission check, and the polarity of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Allowed,
    Denied,
}

impl AccessStatus {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allowed => "ALLOWED",
            Self::Denied => "DENIED",
        })
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display_and_parse() {
        let qname = QName::new("http://www.alfresco.org/model/content/1.0", "folder");
        let rendered = qname.to_string();
        assert_eq!(rendered, "{http://www.alfresco.org/model/content/1.0}folder");
        assert_eq!(QName::parse(&rendered), Some(qname));
    }

    #[test]
    fn test_qname_parse_without_namespace() {
        assert_eq!(QName::parse("All"), Some(QName::new("", "All")));
        assert_eq!(QName::parse("{ns}"), None);
        assert_eq!(QName::parse("{ns"), None);
        assert_eq!(QName::parse(""), None);
    }

    #[test]
    fn test_node_ref_display() {
        let node = NodeRef::new(StoreRef::new("workspace", "SpacesStore"), "abc");
        assert_eq!(node.to_string(), "workspace://SpacesStore/abc");
    }

    #[test]
    fn test_access_status() {
        assert_eq!(AccessStatus::from_allowed(true), AccessStatus::Allowed);
        assert_eq!(AccessStatus::from_allowed(false), AccessStatus::Denied);
        assert!(!AccessStatus::Denied.is_allowed());
        assert_eq!(AccessStatus::Allowed.to_string(), "ALLOWED");
        assert_eq!(
            serde_json::to_string(&AccessStatus::Denied).unwrap(),
            "\"DENIED\""
        );
    }

    #[test]
    fn test_authorities_ignore_insertion_order() {
        let a: Authorities = ["bob", "GROUP_EVERYONE"].iter().map(|s| s.to_string()).collect();
        let b: Authorities = ["GROUP_EVERYONE", "bob"].iter().map(|s| s.to_string()).collect();
        assert_eq!(a, b);
    }
}
