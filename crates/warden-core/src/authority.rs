//! Authority set construction
//!
//! The authority set of a check is the principal's name, the authorities
//! granted at login, the groups and roles a resolver knows for the user,
//! and any dynamic authority that holds on the node under test.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;
use warden_const::{GROUP_EVERYONE, GUEST_AUTHORITY, ROLE_ADMINISTRATOR};
use warden_types::{Authorities, NodeRef, PermissionContext, StoreResult};

use crate::dynamic::DynamicAuthority;
use crate::security::Authentication;

/// Source of the groups and roles a user belongs to
pub trait AuthorityResolver: Send + Sync {
    /// Authorities held by `username`, not including the name itself
    fn authorities_for_user(&self, username: &str) -> StoreResult<BTreeSet<String>>;

    /// Groups that directly or transitively contain `authority`
    fn containing_authorities(&self, _authority: &str) -> StoreResult<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }
}

/// Group membership held in memory
///
/// Every user except the guest is a member of `GROUP_EVERYONE`.
#[derive(Default)]
pub struct InMemoryAuthorityResolver {
    /// member -> groups it is a direct member of
    memberships: RwLock<HashMap<String, BTreeSet<String>>>,
    admins: RwLock<BTreeSet<String>>,
}

impl InMemoryAuthorityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `member` (a user or another group) a member of `group`
    pub fn add_membership(&self, member: impl Into<String>, group: impl Into<String>) {
        self.memberships
            .write()
            .entry(member.into())
            .or_default()
            .insert(group.into());
    }

    pub fn remove_membership(&self, member: &str, group: &str) {
        if let Some(groups) = self.memberships.write().get_mut(member) {
            groups.remove(group);
        }
    }

    pub fn add_admin(&self, username: impl Into<String>) {
        self.admins.write().insert(username.into());
    }

    fn transitive_groups(&self, authority: &str) -> BTreeSet<String> {
        let memberships = self.memberships.read();
        let mut found = BTreeSet::new();
        let mut pending = vec![authority.to_string()];
        while let Some(current) = pending.pop() {
            for group in memberships.get(&current).into_iter().flatten() {
                if found.insert(group.clone()) {
                    pending.push(group.clone());
                }
            }
        }
        found
    }
}

impl AuthorityResolver for InMemoryAuthorityResolver {
    fn authorities_for_user(&self, username: &str) -> StoreResult<BTreeSet<String>> {
        let mut authorities = self.transitive_groups(username);
        if !username.eq_ignore_ascii_case(GUEST_AUTHORITY) {
            authorities.insert(GROUP_EVERYONE.to_string());
        }
        if self.admins.read().contains(username) {
            authorities.insert(ROLE_ADMINISTRATOR.to_string());
        }
        Ok(authorities)
    }

    fn containing_authorities(&self, authority: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self.transitive_groups(authority))
    }
}

/// Builds the authority set for one check
#[derive(Clone)]
pub struct AuthorizationContextBuilder {
    resolver: Arc<dyn AuthorityResolver>,
    dynamic: Vec<Arc<dyn DynamicAuthority>>,
}

impl AuthorizationContextBuilder {
    pub fn new(resolver: Arc<dyn AuthorityResolver>) -> Self {
        Self {
            resolver,
            dynamic: Vec::new(),
        }
    }

    pub fn with_dynamic_authority(mut self, authority: Arc<dyn DynamicAuthority>) -> Self {
        self.dynamic.push(authority);
        self
    }

    pub fn add_dynamic_authority(&mut self, authority: Arc<dyn DynamicAuthority>) {
        self.dynamic.push(authority);
    }

    pub fn resolver(&self) -> &Arc<dyn AuthorityResolver> {
        &self.resolver
    }

    fn base(&self, auth: &Authentication) -> StoreResult<Authorities> {
        let mut authorities = Authorities::new();
        authorities.insert(auth.username.clone());
        if auth.username.eq_ignore_ascii_case(GUEST_AUTHORITY) {
            authorities.insert(GUEST_AUTHORITY.to_string());
        }
        authorities.extend(auth.granted_authorities.iter().cloned());
        authorities.extend(self.resolver.authorities_for_user(&auth.username)?);
        Ok(authorities)
    }

    /// Authorities of `auth`, plus dynamic authorities held on `node`.
    /// Empty when there is no principal.
    pub fn for_node(
        &self,
        auth: Option<&Authentication>,
        node: Option<&NodeRef>,
    ) -> StoreResult<Authorities> {
        let Some(auth) = auth else {
            return Ok(Authorities::new());
        };
        let mut authorities = self.base(auth)?;

        if let Some(node) = node {
            for dynamic in &self.dynamic {
                if dynamic.has_authority(node, &auth.username)? {
                    authorities.insert(dynamic.authority().to_string());
                }
            }
        }

        trace!(user = %auth.username, count = authorities.len(), "Computed node authorities");
        Ok(authorities)
    }

    /// Authorities of `auth`, expanded by the context's dynamic assignment
    /// map. Only authorities already held are expanded, one level deep.
    pub fn for_context(
        &self,
        auth: Option<&Authentication>,
        context: Option<&PermissionContext>,
    ) -> StoreResult<Authorities> {
        let Some(auth) = auth else {
            return Ok(Authorities::new());
        };
        let mut authorities = self.base(auth)?;

        if let Some(context) = context {
            let implied: Vec<String> = authorities
                .iter()
                .filter_map(|a| context.dynamic_authority_assignment.get(a))
                .flatten()
                .cloned()
                .collect();
            authorities.extend(implied);
        }

        trace!(user = %auth.username, count = authorities.len(), "Computed context authorities");
        Ok(authorities)
    }
}

#[cfg(test)]
mod tests {
    use warden_store::MemoryBackend;
    use warden_types::{QName, StoreRef};

    use super::*;
    use crate::dynamic::OwnerDynamicAuthority;

    fn resolver() -> Arc<InMemoryAuthorityResolver> {
        let resolver = Arc::new(InMemoryAuthorityResolver::new());
        resolver.add_membership("alice", "GROUP_editors");
        resolver.add_membership("GROUP_editors", "GROUP_staff");
        resolver.add_admin("admin");
        resolver
    }

    #[test]
    fn test_transitive_groups() {
        let resolver = resolver();
        let authorities = resolver.authorities_for_user("alice").unwrap();
        assert!(authorities.contains("GROUP_editors"));
        assert!(authorities.contains("GROUP_staff"));
        assert!(authorities.contains(GROUP_EVERYONE));
        assert!(!authorities.contains(ROLE_ADMINISTRATOR));

        let containing = resolver.containing_authorities("GROUP_editors").unwrap();
        assert_eq!(containing.into_iter().collect::<Vec<_>>(), vec!["GROUP_staff"]);
    }

    #[test]
    fn test_admin_and_guest() {
        let resolver = resolver();
        assert!(resolver
            .authorities_for_user("admin")
            .unwrap()
            .contains(ROLE_ADMINISTRATOR));
        assert!(!resolver
            .authorities_for_user("Guest")
            .unwrap()
            .contains(GROUP_EVERYONE));
    }

    #[test]
    fn test_no_principal_yields_empty_set() {
        let builder = AuthorizationContextBuilder::new(resolver());
        assert!(builder.for_node(None, None).unwrap().is_empty());
        assert!(builder.for_context(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_for_node_includes_name_granted_and_dynamic() {
        let backend = Arc::new(MemoryBackend::new());
        let root = backend
            .create_root(StoreRef::new("workspace", "SpacesStore"), QName::new("urn:t", "folder"))
            .unwrap();
        backend.set_owner(&root, "alice").unwrap();

        let builder = AuthorizationContextBuilder::new(resolver())
            .with_dynamic_authority(Arc::new(OwnerDynamicAuthority::new(backend)));
        let auth = Authentication::new("alice").with_authority("ROLE_AUDITOR");

        let authorities = builder.for_node(Some(&auth), Some(&root)).unwrap();
        assert!(authorities.contains("alice"));
        assert!(authorities.contains("ROLE_AUDITOR"));
        assert!(authorities.contains("GROUP_staff"));
        assert!(authorities.contains("ROLE_OWNER"));

        let without_node = builder.for_node(Some(&auth), None).unwrap();
        assert!(!without_node.contains("ROLE_OWNER"));
    }

    #[test]
    fn test_guest_marker_is_case_insensitive() {
        let builder = AuthorizationContextBuilder::new(resolver());
        let authorities = builder
            .for_node(Some(&Authentication::new("GUEST")), None)
            .unwrap();
        assert!(authorities.contains("GUEST"));
        assert!(authorities.contains(GUEST_AUTHORITY));
    }

    #[test]
    fn test_context_assignment_expands_held_authorities() {
        let builder = AuthorizationContextBuilder::new(resolver());
        let context = PermissionContext::default()
            .assign("alice", "ROLE_OWNER")
            .assign("bob", "ROLE_LOCK_OWNER");

        let authorities = builder
            .for_context(Some(&Authentication::new("alice")), Some(&context))
            .unwrap();
        assert!(authorities.contains("ROLE_OWNER"));
        assert!(!authorities.contains("ROLE_LOCK_OWNER"));
    }
}
