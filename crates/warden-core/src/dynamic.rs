//! Authorities computed at check time from the node being protected.

use std::sync::Arc;

use warden_const::ROLE_OWNER;
use warden_store::NodeStore;
use warden_types::{NodeRef, StoreResult};

/// A runtime authority bound to a node, e.g. "owner of this document"
pub trait DynamicAuthority: Send + Sync {
    /// Whether `username` holds this authority on `node`
    fn has_authority(&self, node: &NodeRef, username: &str) -> StoreResult<bool>;

    /// The authority string contributed when held
    fn authority(&self) -> &str;
}

/// Grants `ROLE_OWNER` to the recorded owner of a node
pub struct OwnerDynamicAuthority {
    nodes: Arc<dyn NodeStore>,
}

impl OwnerDynamicAuthority {
    pub fn new(nodes: Arc<dyn NodeStore>) -> Self {
        Self { nodes }
    }
}

impl DynamicAuthority for OwnerDynamicAuthority {
    fn has_authority(&self, node: &NodeRef, username: &str) -> StoreResult<bool> {
        Ok(self.nodes.owner(node)?.as_deref() == Some(username))
    }

    fn authority(&self) -> &str {
        ROLE_OWNER
    }
}
