//! In-memory node graph and permission storage for testing and development

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;
use warden_types::{
    AccessControlList, AclId, ChildAssociation, NodePermissionEntry, NodeRef, PermissionEntry,
    PermissionReference, QName, StoreError, StoreRef,
};

use crate::{NodeStore, PermissionStore, Result};

#[derive(Debug, Clone)]
struct NodeRecord {
    type_qname: QName,
    aspects: BTreeSet<QName>,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    owner: Option<String>,
}

#[derive(Default)]
struct MemoryStore {
    nodes: HashMap<NodeRef, NodeRecord>,
    roots: HashMap<StoreRef, NodeRef>,
    node_entries: HashMap<NodeRef, NodePermissionEntry>,
    store_entries: HashMap<StoreRef, Vec<PermissionEntry>>,
    acls: HashMap<AclId, AccessControlList>,
}

impl MemoryStore {
    fn record(&self, node: &NodeRef) -> Result<&NodeRecord> {
        self.nodes
            .get(node)
            .ok_or_else(|| StoreError::NotFound(node.to_string()))
    }

    fn record_mut(&mut self, node: &NodeRef) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| StoreError::NotFound(node.to_string()))
    }

    fn node_entry_mut(&mut self, node: &NodeRef) -> &mut NodePermissionEntry {
        self.node_entries
            .entry(node.clone())
            .or_insert_with(|| NodePermissionEntry::new(node.clone(), Vec::new(), true))
    }

    fn association(&self, node: &NodeRef, record: &NodeRecord) -> ChildAssociation {
        ChildAssociation {
            parent: record.parent.clone(),
            child: node.clone(),
            primary: true,
        }
    }
}

/// Replace an entry with the same authority, permission and access, keeping
/// an entry of the opposite access alongside
fn upsert(entries: &mut Vec<PermissionEntry>, entry: PermissionEntry) {
    entries.retain(|e| {
        !(e.authority == entry.authority
            && e.permission == entry.permission
            && e.access == entry.access)
    });
    entries.push(entry);
}

/// In-memory implementation of both [`NodeStore`] and [`PermissionStore`]
pub struct MemoryBackend {
    data: Arc<RwLock<MemoryStore>>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryStore::default())),
            offline: AtomicBool::new(false),
        }
    }

    /// While offline every operation fails with a database error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Database("backend offline".to_string()));
        }
        Ok(())
    }

    /// Create the root node of a store
    pub fn create_root(&self, store: StoreRef, type_qname: QName) -> Result<NodeRef> {
        self.check_online()?;
        let mut data = self.data.write();
        if data.roots.contains_key(&store) {
            return Err(StoreError::Conflict(format!("store {store} already has a root")));
        }

        let node = NodeRef::new(store.clone(), Uuid::new_v4().to_string());
        data.nodes.insert(
            node.clone(),
            NodeRecord {
                type_qname,
                aspects: BTreeSet::new(),
                parent: None,
                children: Vec::new(),
                owner: None,
            },
        );
        data.roots.insert(store, node.clone());
        debug!(node = %node, "Created store root");
        Ok(node)
    }

    /// Create a node as a primary child of `parent`, in the parent's store
    pub fn create_node(&self, parent: &NodeRef, type_qname: QName) -> Result<NodeRef> {
        self.check_online()?;
        let mut data = self.data.write();
        let node = NodeRef::new(parent.store.clone(), Uuid::new_v4().to_string());
        data.record_mut(parent)?.children.push(node.clone());
        data.nodes.insert(
            node.clone(),
            NodeRecord {
                type_qname,
                aspects: BTreeSet::new(),
                parent: Some(parent.clone()),
                children: Vec::new(),
                owner: None,
            },
        );
        Ok(node)
    }

    pub fn add_aspect(&self, node: &NodeRef, aspect: QName) -> Result<()> {
        self.check_online()?;
        self.data.write().record_mut(node)?.aspects.insert(aspect);
        Ok(())
    }

    pub fn set_owner(&self, node: &NodeRef, owner: impl Into<String>) -> Result<()> {
        self.check_online()?;
        self.data.write().record_mut(node)?.owner = Some(owner.into());
        Ok(())
    }

    /// Re-parent a node, returning the old and new primary associations
    pub fn move_node(
        &self,
        node: &NodeRef,
        new_parent: &NodeRef,
    ) -> Result<(ChildAssociation, ChildAssociation)> {
        self.check_online()?;
        let mut data = self.data.write();
        data.record(new_parent)?;

        // Refuse to move a node beneath itself
        let mut cursor = Some(new_parent.clone());
        while let Some(current) = cursor {
            if &current == node {
                return Err(StoreError::Conflict(format!(
                    "cannot move {node} beneath itself"
                )));
            }
            cursor = data.record(&current)?.parent.clone();
        }

        let record = data.record(node)?.clone();
        let old = data.association(node, &record);
        if let Some(old_parent) = &record.parent {
            data.record_mut(old_parent)?.children.retain(|c| c != node);
        }
        data.record_mut(new_parent)?.children.push(node.clone());
        data.record_mut(node)?.parent = Some(new_parent.clone());

        let new = ChildAssociation {
            parent: Some(new_parent.clone()),
            child: node.clone(),
            primary: true,
        };
        Ok((old, new))
    }

    /// Delete a node, its descendants and their permission entries
    pub fn delete_node(&self, node: &NodeRef) -> Result<()> {
        self.check_online()?;
        let mut data = self.data.write();
        let parent = data.record(node)?.parent.clone();
        if let Some(parent) = parent {
            data.record_mut(&parent)?.children.retain(|c| c != node);
        }

        let mut pending = vec![node.clone()];
        while let Some(current) = pending.pop() {
            if let Some(record) = data.nodes.remove(&current) {
                pending.extend(record.children);
            }
            data.node_entries.remove(&current);
        }
        data.roots.retain(|_, root| *root != *node);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore for MemoryBackend {
    fn exists(&self, node: &NodeRef) -> Result<bool> {
        self.check_online()?;
        Ok(self.data.read().nodes.contains_key(node))
    }

    fn node_type(&self, node: &NodeRef) -> Result<QName> {
        self.check_online()?;
        Ok(self.data.read().record(node)?.type_qname.clone())
    }

    fn aspects(&self, node: &NodeRef) -> Result<BTreeSet<QName>> {
        self.check_online()?;
        Ok(self.data.read().record(node)?.aspects.clone())
    }

    fn primary_parent(&self, node: &NodeRef) -> Result<Option<ChildAssociation>> {
        self.check_online()?;
        let data = self.data.read();
        let record = data.record(node)?;
        Ok(record
            .parent
            .as_ref()
            .map(|_| data.association(node, record)))
    }

    fn child_associations(&self, node: &NodeRef) -> Result<Vec<ChildAssociation>> {
        self.check_online()?;
        let data = self.data.read();
        Ok(data
            .record(node)?
            .children
            .iter()
            .map(|child| ChildAssociation {
                parent: Some(node.clone()),
                child: child.clone(),
                primary: true,
            })
            .collect())
    }

    fn root_node(&self, store: &StoreRef) -> Result<NodeRef> {
        self.check_online()?;
        self.data
            .read()
            .roots
            .get(store)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(store.to_string()))
    }

    fn owner(&self, node: &NodeRef) -> Result<Option<String>> {
        self.check_online()?;
        Ok(self.data.read().record(node)?.owner.clone())
    }
}

impl PermissionStore for MemoryBackend {
    fn permissions(&self, node: &NodeRef) -> Result<Option<NodePermissionEntry>> {
        self.check_online()?;
        Ok(self.data.read().node_entries.get(node).cloned())
    }

    fn store_permissions(&self, store: &StoreRef) -> Result<Vec<PermissionEntry>> {
        self.check_online()?;
        Ok(self
            .data
            .read()
            .store_entries
            .get(store)
            .cloned()
            .unwrap_or_default())
    }

    fn access_control_list(&self, id: AclId) -> Result<Option<AccessControlList>> {
        self.check_online()?;
        Ok(self.data.read().acls.get(&id).cloned())
    }

    fn set_permission(&self, node: &NodeRef, entry: PermissionEntry) -> Result<()> {
        self.check_online()?;
        let mut data = self.data.write();
        upsert(&mut data.node_entry_mut(node).entries, entry);
        Ok(())
    }

    fn delete_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: &PermissionReference,
    ) -> Result<()> {
        self.check_online()?;
        if let Some(entry) = self.data.write().node_entries.get_mut(node) {
            entry
                .entries
                .retain(|e| !(e.authority == authority && &e.permission == permission));
        }
        Ok(())
    }

    fn clear_permission(&self, node: &NodeRef, authority: &str) -> Result<()> {
        self.check_online()?;
        if let Some(entry) = self.data.write().node_entries.get_mut(node) {
            entry.entries.retain(|e| e.authority != authority);
        }
        Ok(())
    }

    fn delete_permissions(&self, node: &NodeRef) -> Result<()> {
        self.check_online()?;
        if let Some(entry) = self.data.write().node_entries.get_mut(node) {
            entry.entries.clear();
        }
        Ok(())
    }

    fn delete_permissions_for_authority(&self, authority: &str) -> Result<()> {
        self.check_online()?;
        let mut data = self.data.write();
        for entry in data.node_entries.values_mut() {
            entry.entries.retain(|e| e.authority != authority);
        }
        for entries in data.store_entries.values_mut() {
            entries.retain(|e| e.authority != authority);
        }
        Ok(())
    }

    fn set_node_permission_entry(&self, entry: NodePermissionEntry) -> Result<()> {
        self.check_online()?;
        self.data
            .write()
            .node_entries
            .insert(entry.node.clone(), entry);
        Ok(())
    }

    fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()> {
        self.check_online()?;
        self.data.write().node_entry_mut(node).inherit_parent_permissions = inherit;
        Ok(())
    }

    fn inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool> {
        self.check_online()?;
        Ok(self
            .data
            .read()
            .node_entries
            .get(node)
            .map_or(true, |e| e.inherit_parent_permissions))
    }

    fn set_store_permission(&self, store: &StoreRef, entry: PermissionEntry) -> Result<()> {
        self.check_online()?;
        upsert(
            self.data.write().store_entries.entry(store.clone()).or_default(),
            entry,
        );
        Ok(())
    }

    fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &PermissionReference,
    ) -> Result<()> {
        self.check_online()?;
        if let Some(entries) = self.data.write().store_entries.get_mut(store) {
            entries.retain(|e| !(e.authority == authority && &e.permission == permission));
        }
        Ok(())
    }

    fn clear_store_permission(&self, store: &StoreRef, authority: &str) -> Result<()> {
        self.check_online()?;
        if let Some(entries) = self.data.write().store_entries.get_mut(store) {
            entries.retain(|e| e.authority != authority);
        }
        Ok(())
    }

    fn delete_store_permissions(&self, store: &StoreRef) -> Result<()> {
        self.check_online()?;
        self.data.write().store_entries.remove(store);
        Ok(())
    }

    fn set_access_control_list(&self, acl: AccessControlList) -> Result<()> {
        self.check_online()?;
        self.data.write().acls.insert(acl.id, acl);
        Ok(())
    }

    fn find_nodes_by_permission(
        &self,
        authority: &str,
        permission: &PermissionReference,
        allow: bool,
    ) -> Result<Vec<NodeRef>> {
        self.check_online()?;
        let data = self.data.read();
        let mut nodes: Vec<NodeRef> = data
            .node_entries
            .values()
            .filter(|npe| {
                npe.entries.iter().any(|e| {
                    e.authority == authority
                        && &e.permission == permission
                        && e.is_allowed() == allow
                })
            })
            .map(|npe| npe.node.clone())
            .collect();
        nodes.sort();
        Ok(nodes)
    }

    fn all_set_permissions(
        &self,
        authority: &str,
    ) -> Result<BTreeMap<NodeRef, Vec<PermissionEntry>>> {
        self.check_online()?;
        let data = self.data.read();
        let mut result = BTreeMap::new();
        for npe in data.node_entries.values() {
            let entries: Vec<PermissionEntry> = npe
                .entries
                .iter()
                .filter(|e| e.authority == authority)
                .cloned()
                .collect();
            if !entries.is_empty() {
                result.insert(npe.node.clone(), entries);
            }
        }
        Ok(result)
    }
}
