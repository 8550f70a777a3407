//! Permission service façade
//!
//! Orchestrates authority computation, the decision cache and evaluator
//! selection, and owns every mutation path so that each one clears the
//! cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, Span};
use warden_cache::{AccessCache, AccessCacheKey, CacheKind, CacheStats, CacheTarget};
use warden_const::{ALL_PERMISSIONS, GROUP_EVERYONE, ROLE_OWNER};
use warden_model::PermissionModel;
use warden_observe::logging::{check_span, record_check_decision};
use warden_observe::metrics::{
    record_cache_hit, record_cache_invalidation, record_check, update_cache_stats,
};
use warden_store::{NodeStore, PermissionStore};
use warden_types::{
    AccessControlList, AccessPermission, AccessStatus, AclId, ChildAssociation,
    NodePermissionEntry, NodeRef, PermissionContext, PermissionEntry, PermissionReference, QName,
    StoreRef,
};

use crate::authority::{AuthorityResolver, AuthorizationContextBuilder};
use crate::dynamic::DynamicAuthority;
use crate::evaluator::{base_type, AclEvaluator, NodeEvaluator};
use crate::security::SecurityContext;
use crate::target::EvaluationTarget;
use crate::{EvalError, Result};

/// Decides and manages permissions on nodes and access control lists
pub struct PermissionService {
    nodes: Arc<dyn NodeStore>,
    store: Arc<dyn PermissionStore>,
    model: Arc<dyn PermissionModel>,
    authorities: AuthorizationContextBuilder,
    cache: Option<Arc<AccessCache>>,
}

impl PermissionService {
    /// Create a service with the default decision cache
    pub fn new(
        nodes: Arc<dyn NodeStore>,
        store: Arc<dyn PermissionStore>,
        model: Arc<dyn PermissionModel>,
        resolver: Arc<dyn AuthorityResolver>,
    ) -> Self {
        Self::new_with_cache(
            nodes,
            store,
            model,
            resolver,
            Some(Arc::new(AccessCache::default())),
        )
    }

    /// Create a service with an explicit cache, or none
    pub fn new_with_cache(
        nodes: Arc<dyn NodeStore>,
        store: Arc<dyn PermissionStore>,
        model: Arc<dyn PermissionModel>,
        resolver: Arc<dyn AuthorityResolver>,
        cache: Option<Arc<AccessCache>>,
    ) -> Self {
        Self {
            nodes,
            store,
            model,
            authorities: AuthorizationContextBuilder::new(resolver),
            cache,
        }
    }

    pub fn with_dynamic_authority(mut self, authority: Arc<dyn DynamicAuthority>) -> Self {
        self.authorities.add_dynamic_authority(authority);
        self
    }

    pub fn authorization_context(&self) -> &AuthorizationContextBuilder {
        &self.authorities
    }

    pub(crate) fn nodes(&self) -> &dyn NodeStore {
        self.nodes.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn PermissionStore {
        self.store.as_ref()
    }

    pub(crate) fn model(&self) -> &dyn PermissionModel {
        self.model.as_ref()
    }

    pub(crate) fn cached(&self, key: &AccessCacheKey) -> Option<AccessStatus> {
        self.cache.as_ref().and_then(|cache| cache.get(key))
    }

    pub(crate) fn remember(&self, key: AccessCacheKey, status: AccessStatus) {
        if let Some(cache) = &self.cache {
            cache.put(key, status);
        }
    }

    fn invalidate(&self, reason: &'static str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            record_cache_invalidation(reason);
            debug!(reason, "Access cache cleared");
        }
    }

    fn reference(&self, permission: &str) -> Result<PermissionReference> {
        self.model
            .permission_reference(None, permission)
            .ok_or_else(|| EvalError::UnknownPermission(permission.to_string()))
    }

    fn normalize(&self, permission: &PermissionReference) -> PermissionReference {
        if *permission == self.model.legacy_all_permissions_reference() {
            self.model.all_permissions_reference()
        } else {
            permission.clone()
        }
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Check a permission by name on a node.
    ///
    /// No node is ALLOWED, no permission is DENIED, a node that no longer
    /// exists is ALLOWED and a name the model does not know is DENIED.
    #[instrument(skip(self, ctx))]
    pub fn has_permission(
        &self,
        ctx: &SecurityContext,
        node: Option<&NodeRef>,
        permission: Option<&str>,
    ) -> Result<AccessStatus> {
        let Some(node) = node else {
            return Ok(AccessStatus::Allowed);
        };
        let Some(permission) = permission else {
            return Ok(AccessStatus::Denied);
        };
        if !self.nodes.exists(node)? {
            return Ok(AccessStatus::Allowed);
        }
        let Some(reference) = self.model.permission_reference(None, permission) else {
            debug!(permission, "Unknown permission");
            return Ok(AccessStatus::Denied);
        };
        self.check_node(ctx, node, &reference, 0)
    }

    /// Check a resolved permission on a node
    pub fn has_permission_ref(
        &self,
        ctx: &SecurityContext,
        node: &NodeRef,
        permission: &PermissionReference,
    ) -> Result<AccessStatus> {
        self.has_permission_at_depth(ctx, node, permission, 0)
    }

    /// Check started from a requirement of another evaluation, `depth`
    /// levels down
    pub(crate) fn has_permission_at_depth(
        &self,
        ctx: &SecurityContext,
        node: &NodeRef,
        permission: &PermissionReference,
        depth: usize,
    ) -> Result<AccessStatus> {
        if !self.nodes.exists(node)? {
            return Ok(AccessStatus::Allowed);
        }
        self.check_node(ctx, node, permission, depth)
    }

    fn check_node(
        &self,
        ctx: &SecurityContext,
        node: &NodeRef,
        permission: &PermissionReference,
        depth: usize,
    ) -> Result<AccessStatus> {
        let span = check_span(&node.to_string(), permission.name());
        let _guard = span.enter();
        let start = Instant::now();

        let permission = self.normalize(permission);

        let Some(auth) = ctx.effective() else {
            return Ok(finish(&span, start, AccessStatus::Denied, false));
        };
        if auth.is_system() {
            return Ok(AccessStatus::Allowed);
        }

        let authorities = self.authorities.for_node(Some(auth), Some(node))?;
        let available = self.model.all_permissions_for_node(self.nodes(), node)?;
        let key = AccessCacheKey::for_node(&authorities, node, &permission, CacheKind::HasPermission);

        if !available.contains(&permission) {
            self.remember(key, AccessStatus::Denied);
            return Ok(finish(&span, start, AccessStatus::Denied, false));
        }

        if ctx.current().is_some_and(|current| current.is_system()) {
            return Ok(AccessStatus::Allowed);
        }

        if let Some(cache) = &self.cache {
            let hit = cache.get(&key);
            record_cache_hit(hit.is_some());
            if let Some(status) = hit {
                return Ok(finish(&span, start, status, true));
            }
        }

        let type_qname = self.nodes.node_type(node)?;
        let aspects = self.nodes.aspects(node)?;
        let evaluator = NodeEvaluator::at_depth(self, ctx, permission, type_qname, aspects, depth)?;
        let status = AccessStatus::from_allowed(evaluator.evaluate(&authorities, node)?);

        debug!(
            user = %auth.username,
            node = %node,
            permission = %evaluator.required(),
            decision = %status,
            "Evaluated node permission"
        );

        self.remember(key, status);
        Ok(finish(&span, start, status, false))
    }

    /// Check a permission by name against an access control list.
    ///
    /// No ACL id is DENIED. When the context names a store ACL, that list
    /// must independently grant the permission to the principal's
    /// context-free authorities.
    #[instrument(skip(self, ctx, context))]
    pub fn has_acl_permission(
        &self,
        ctx: &SecurityContext,
        acl: Option<AclId>,
        context: &PermissionContext,
        permission: Option<&str>,
    ) -> Result<AccessStatus> {
        let Some(acl) = acl else {
            return Ok(AccessStatus::Denied);
        };
        let Some(permission) = permission else {
            return Ok(AccessStatus::Denied);
        };
        let Some(reference) = self.model.permission_reference(None, permission) else {
            debug!(permission, "Unknown permission");
            return Ok(AccessStatus::Denied);
        };
        self.has_acl_permission_ref(ctx, acl, context, &reference)
    }

    /// Check a resolved permission against an access control list
    pub fn has_acl_permission_ref(
        &self,
        ctx: &SecurityContext,
        acl: AclId,
        context: &PermissionContext,
        permission: &PermissionReference,
    ) -> Result<AccessStatus> {
        let span = check_span(&acl.to_string(), permission.name());
        let _guard = span.enter();
        let start = Instant::now();

        let Some(auth) = ctx.effective() else {
            return Ok(finish(&span, start, AccessStatus::Denied, false));
        };
        if auth.is_system() {
            return Ok(AccessStatus::Allowed);
        }

        let authorities = self.authorities.for_context(Some(auth), Some(context))?;
        let type_qname = context.type_qname.clone().unwrap_or_else(base_type);

        let available = self.model.all_permissions(&type_qname, &context.aspects);
        if !available.contains(permission) {
            return Ok(finish(&span, start, AccessStatus::Denied, false));
        }

        if ctx.current().is_some_and(|current| current.is_system()) {
            return Ok(AccessStatus::Allowed);
        }

        let permission = self.normalize(permission);
        let key = AccessCacheKey::new(
            authorities.clone(),
            CacheTarget::Acl {
                acl,
                store_acl: context.store_acl,
                type_qname: type_qname.clone(),
                aspects: context.aspects.clone(),
            },
            permission.clone(),
            CacheKind::HasPermission,
        );
        if let Some(cache) = &self.cache {
            let hit = cache.get(&key);
            record_cache_hit(hit.is_some());
            if let Some(status) = hit {
                return Ok(finish(&span, start, status, true));
            }
        }

        let evaluator = AclEvaluator::new(
            self.model(),
            self.store(),
            permission,
            type_qname,
            context.aspects.clone(),
        )?;
        let mut allowed = evaluator.evaluate(&authorities, acl)?;
        if allowed {
            if let Some(store_acl) = context.store_acl {
                let store_authorities = self.authorities.for_context(Some(auth), None)?;
                allowed = evaluator.evaluate(&store_authorities, store_acl)?;
            }
        }
        let status = AccessStatus::from_allowed(allowed);

        debug!(
            user = %auth.username,
            acl = %acl,
            permission = %evaluator.required(),
            decision = %status,
            "Evaluated ACL permission"
        );

        self.remember(key, status);
        Ok(finish(&span, start, status, false))
    }

    /// Check a permission against either representation
    pub fn evaluate(
        &self,
        ctx: &SecurityContext,
        target: &EvaluationTarget,
        permission: &str,
    ) -> Result<AccessStatus> {
        match target {
            EvaluationTarget::Node(node) => self.has_permission(ctx, Some(node), Some(permission)),
            EvaluationTarget::Acl { acl, context } => {
                self.has_acl_permission(ctx, *acl, context, Some(permission))
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Every settable permission of the node with the current principal's
    /// status for it
    pub fn get_permissions(
        &self,
        ctx: &SecurityContext,
        node: &NodeRef,
    ) -> Result<Vec<AccessPermission>> {
        let username = ctx.effective_user_name().unwrap_or_default().to_string();
        let mut result = Vec::new();
        for permission in self.model.exposed_permissions_for_node(self.nodes(), node)? {
            let status = self.has_permission_ref(ctx, node, &permission)?;
            result.push(AccessPermission::new(
                self.model.permission_name(&permission),
                status,
                username.clone(),
            ));
        }
        Ok(result)
    }

    fn access_permissions(&self, entries: &[PermissionEntry]) -> Vec<AccessPermission> {
        entries
            .iter()
            .map(|e| {
                AccessPermission::new(
                    self.model.permission_name(&e.permission),
                    e.access,
                    e.authority.clone(),
                )
            })
            .collect()
    }

    /// Entries set directly on the node
    pub fn get_all_set_permissions(&self, node: &NodeRef) -> Result<Vec<AccessPermission>> {
        Ok(self
            .store
            .permissions(node)?
            .map(|entry| self.access_permissions(&entry.entries))
            .unwrap_or_default())
    }

    pub fn get_all_set_store_permissions(&self, store: &StoreRef) -> Result<Vec<AccessPermission>> {
        Ok(self.access_permissions(&self.store.store_permissions(store)?))
    }

    /// Names of the permissions that may be set on the node
    pub fn get_settable_permissions(&self, node: &NodeRef) -> Result<BTreeSet<String>> {
        Ok(self
            .model
            .exposed_permissions_for_node(self.nodes(), node)?
            .iter()
            .map(|p| self.model.permission_name(p))
            .collect())
    }

    pub fn get_settable_permissions_for_type(&self, type_qname: &QName) -> BTreeSet<String> {
        self.model
            .exposed_permissions(type_qname, &BTreeSet::new())
            .iter()
            .map(|p| self.model.permission_name(p))
            .collect()
    }

    pub fn get_set_permissions(&self, node: &NodeRef) -> Result<Option<NodePermissionEntry>> {
        Ok(self.store.permissions(node)?)
    }

    pub fn inherit_parent_permissions(&self, node: &NodeRef) -> Result<bool> {
        Ok(self.store.inherit_parent_permissions(node)?)
    }

    /// Nodes carrying an entry for the authority and permission.
    ///
    /// Optionally widened to the groups containing the authority and to
    /// every permission that grants the one asked for.
    pub fn find_nodes_by_assigned_permission(
        &self,
        authority: &str,
        permission: &str,
        allow: bool,
        include_containing_authorities: bool,
        include_containing_permissions: bool,
    ) -> Result<BTreeSet<NodeRef>> {
        let reference = self.reference(permission)?;

        let mut authorities = BTreeSet::from([authority.to_string()]);
        if include_containing_authorities {
            authorities.extend(self.authorities.resolver().containing_authorities(authority)?);
        }

        let permissions = if include_containing_permissions {
            self.model.granting_permissions(&reference)
        } else {
            BTreeSet::from([reference])
        };

        let mut found = BTreeSet::new();
        for authority in &authorities {
            for permission in &permissions {
                found.extend(self.store.find_nodes_by_permission(authority, permission, allow)?);
            }
        }
        Ok(found)
    }

    pub fn all_set_permissions_for_authority(
        &self,
        authority: &str,
    ) -> Result<BTreeMap<NodeRef, Vec<AccessPermission>>> {
        Ok(self
            .store
            .all_set_permissions(authority)?
            .into_iter()
            .map(|(node, entries)| {
                let permissions = self.access_permissions(&entries);
                (node, permissions)
            })
            .collect())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    #[instrument(skip(self))]
    pub fn set_permission(
        &self,
        node: &NodeRef,
        authority: &str,
        permission: &str,
        allow: bool,
    ) -> Result<()> {
        let reference = self.reference(permission)?;
        self.store.set_permission(
            node,
            PermissionEntry::new(authority, reference, AccessStatus::from_allowed(allow)),
        )?;
        self.invalidate("set_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_permission(&self, node: &NodeRef, authority: &str, permission: &str) -> Result<()> {
        let reference = self.reference(permission)?;
        self.store.delete_permission(node, authority, &reference)?;
        self.invalidate("delete_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn clear_permission(&self, node: &NodeRef, authority: &str) -> Result<()> {
        self.store.clear_permission(node, authority)?;
        self.invalidate("clear_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_permissions(&self, node: &NodeRef) -> Result<()> {
        self.store.delete_permissions(node)?;
        self.invalidate("delete_permissions");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_permissions_for_authority(&self, authority: &str) -> Result<()> {
        self.store.delete_permissions_for_authority(authority)?;
        self.invalidate("delete_permissions_for_authority");
        Ok(())
    }

    #[instrument(skip(self, entry), fields(node = %entry.node))]
    pub fn set_node_permission_entry(&self, entry: NodePermissionEntry) -> Result<()> {
        self.store.set_node_permission_entry(entry)?;
        self.invalidate("set_node_permission_entry");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_inherit_parent_permissions(&self, node: &NodeRef, inherit: bool) -> Result<()> {
        self.store.set_inherit_parent_permissions(node, inherit)?;
        self.invalidate("set_inherit_parent_permissions");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &str,
        allow: bool,
    ) -> Result<()> {
        let reference = self.reference(permission)?;
        self.store.set_store_permission(
            store,
            PermissionEntry::new(authority, reference, AccessStatus::from_allowed(allow)),
        )?;
        self.invalidate("set_store_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_store_permission(
        &self,
        store: &StoreRef,
        authority: &str,
        permission: &str,
    ) -> Result<()> {
        let reference = self.reference(permission)?;
        self.store.delete_store_permission(store, authority, &reference)?;
        self.invalidate("delete_store_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn clear_store_permission(&self, store: &StoreRef, authority: &str) -> Result<()> {
        self.store.clear_store_permission(store, authority)?;
        self.invalidate("clear_store_permission");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_store_permissions(&self, store: &StoreRef) -> Result<()> {
        self.store.delete_store_permissions(store)?;
        self.invalidate("delete_store_permissions");
        Ok(())
    }

    #[instrument(skip(self, acl), fields(acl = %acl.id))]
    pub fn set_access_control_list(&self, acl: AccessControlList) -> Result<()> {
        self.store.set_access_control_list(acl)?;
        self.invalidate("set_access_control_list");
        Ok(())
    }

    /// A moved node's ancestors changed; every cached decision may be stale
    pub fn on_move_node(&self, old: &ChildAssociation, new: &ChildAssociation) {
        debug!(node = %new.child, from = ?old.parent, to = ?new.parent, "Node moved");
        self.invalidate("move_node");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn owner_authority(&self) -> &'static str {
        ROLE_OWNER
    }

    pub fn all_authorities(&self) -> &'static str {
        GROUP_EVERYONE
    }

    pub fn all_permission(&self) -> &'static str {
        ALL_PERMISSIONS
    }

    pub fn permission_reference(&self, permission: &str) -> Option<PermissionReference> {
        self.model.permission_reference(None, permission)
    }

    pub fn all_permission_reference(&self) -> PermissionReference {
        self.model.all_permissions_reference()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| {
            let stats = cache.stats();
            update_cache_stats(stats.entry_count, stats.hit_rate);
            stats
        })
    }
}

fn finish(span: &Span, start: Instant, status: AccessStatus, cached: bool) -> AccessStatus {
    record_check_decision(span, status.as_str(), cached);
    record_check(status.as_str(), start.elapsed().as_secs_f64());
    status
}
