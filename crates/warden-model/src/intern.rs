//! Canonical [`PermissionReference`] instances.

use std::collections::HashMap;

use parking_lot::RwLock;
use warden_types::{PermissionKey, PermissionReference, QName};

/// Get-or-create table of permission references keyed by owning type,
/// then by name.
///
/// Lookups take the shared lock. A miss releases it before taking the
/// exclusive lock and re-checking, so the table never upgrades a lock it
/// already holds.
#[derive(Default)]
pub struct InternTable {
    entries: RwLock<HashMap<QName, HashMap<String, PermissionReference>>>,
}

impl InternTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical reference for `(qname, name)`
    pub fn get(&self, qname: &QName, name: &str) -> PermissionReference {
        {
            let entries = self.entries.read();
            if let Some(found) = entries.get(qname).and_then(|names| names.get(name)) {
                return found.clone();
            }
        }

        let mut entries = self.entries.write();
        entries
            .entry(qname.clone())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| {
                PermissionReference::from_key(PermissionKey {
                    qname: qname.clone(),
                    name: name.to_string(),
                })
            })
            .clone()
    }

    /// Lookup without creating
    pub fn find(&self, qname: &QName, name: &str) -> Option<PermissionReference> {
        self.entries
            .read()
            .get(qname)
            .and_then(|names| names.get(name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
