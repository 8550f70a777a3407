use std::cell::Cell;
use std::collections::BTreeSet;

use tracing::trace;
use warden_cache::{AccessCacheKey, CacheKind};
use warden_observe::logging::{eval_span, record_eval_result};
use warden_observe::metrics::record_evaluation;
use warden_types::{AccessStatus, Authorities, NodeRef, PermissionReference, QName, RequirementScope};

use super::{
    check_depth, check_entries, check_global_permissions, granters_for, node_requirements_for,
    DeniedSet,
};
use crate::security::SecurityContext;
use crate::service::PermissionService;
use crate::Result;

/// Evaluates one permission on a node of the live graph
///
/// Requirements are resolved once, against the type and aspects of the
/// node the check started on; nested evaluators for node and parent
/// requirements keep that type.
pub struct NodeEvaluator<'a> {
    service: &'a PermissionService,
    ctx: &'a SecurityContext,
    required: PermissionReference,
    type_qname: QName,
    aspects: BTreeSet<QName>,
    node_requirements: BTreeSet<PermissionReference>,
    parent_requirements: BTreeSet<PermissionReference>,
    children_requirements: BTreeSet<PermissionReference>,
    granters: BTreeSet<PermissionReference>,
    depth: usize,
}

impl<'a> NodeEvaluator<'a> {
    pub fn new(
        service: &'a PermissionService,
        ctx: &'a SecurityContext,
        required: PermissionReference,
        type_qname: QName,
        aspects: BTreeSet<QName>,
    ) -> Result<Self> {
        Self::at_depth(service, ctx, required, type_qname, aspects, 0)
    }

    pub(crate) fn at_depth(
        service: &'a PermissionService,
        ctx: &'a SecurityContext,
        required: PermissionReference,
        type_qname: QName,
        aspects: BTreeSet<QName>,
        depth: usize,
    ) -> Result<Self> {
        check_depth(&required, depth)?;

        let model = service.model();
        let node_requirements = node_requirements_for(model, &required, &type_qname, &aspects);
        let parent_requirements =
            model.required_permissions(&required, &type_qname, &aspects, RequirementScope::Parent);
        let children_requirements =
            model.required_permissions(&required, &type_qname, &aspects, RequirementScope::Children);
        let granters = granters_for(model, &required);

        Ok(Self {
            service,
            ctx,
            required,
            type_qname,
            aspects,
            node_requirements,
            parent_requirements,
            children_requirements,
            granters,
            depth,
        })
    }

    fn nested(&self, required: &PermissionReference) -> Result<NodeEvaluator<'a>> {
        Self::at_depth(
            self.service,
            self.ctx,
            required.clone(),
            self.type_qname.clone(),
            self.aspects.clone(),
            self.depth + 1,
        )
    }

    pub fn required(&self) -> &PermissionReference {
        &self.required
    }

    /// Whether `authorities` hold the permission on `node`
    pub fn evaluate(&self, authorities: &Authorities, node: &NodeRef) -> Result<bool> {
        let span = eval_span(self.required.name(), self.depth);
        let _guard = span.enter();
        record_evaluation("node");

        let result = self.evaluate_recursive(authorities, node, &DeniedSet::new(), None)?;
        record_eval_result(&span, result);
        Ok(result)
    }

    /// `recursive_in` is set when this level resolves a permission that a
    /// descendant deferred to its ancestors
    fn evaluate_recursive(
        &self,
        authorities: &Authorities,
        node: &NodeRef,
        denied: &DeniedSet,
        recursive_in: Option<&Cell<bool>>,
    ) -> Result<bool> {
        let model = self.service.model();

        let mut locally_denied = denied.clone();
        locally_denied.extend(self.denied_at(node)?);

        // Set when resolution of `required` is deferred to an ancestor
        let mut recursive_out: Option<Cell<bool>> = None;

        if model.check_permission(&self.required) {
            if self.parent_requirements.contains(&self.required) {
                if check_global_permissions(model, authorities, &self.granters)
                    || self.check_required(authorities, node, &locally_denied)?
                {
                    if let Some(flag) = recursive_in {
                        flag.set(true);
                    }
                } else {
                    recursive_out = Some(Cell::new(false));
                }
            } else if !self.has_single_permission(authorities, node)? {
                return Ok(false);
            }
        }

        for requirement in &self.node_requirements {
            let nested = self.nested(requirement)?;
            if !nested.evaluate_recursive(authorities, node, &locally_denied, None)? {
                trace!(requirement = %requirement, "Node requirement not met");
                return Ok(false);
            }
        }

        if let Some(parent) = self.inheriting_parent(node)? {
            locally_denied.extend(self.denied_at(&parent)?);
            for requirement in &self.parent_requirements {
                let held = if *requirement == self.required {
                    let held = self.evaluate_recursive(
                        authorities,
                        &parent,
                        &locally_denied,
                        recursive_out.as_ref(),
                    )?;
                    if recursive_out.as_ref().is_some_and(Cell::get) {
                        if let Some(flag) = recursive_in {
                            flag.set(true);
                        }
                    }
                    held
                } else {
                    self.nested(requirement)?
                        .evaluate_recursive(authorities, &parent, &locally_denied, None)?
                };
                if !held {
                    trace!(requirement = %requirement, "Parent requirement not met");
                    return Ok(false);
                }
            }
        }

        // A deferred permission that no ancestor resolved fails, including
        // when this node stops inheritance
        if recursive_out.is_some_and(|flag| !flag.get()) {
            return Ok(false);
        }

        if !self.children_requirements.is_empty() {
            let children = self.service.nodes().child_associations(node)?;
            for requirement in &self.children_requirements {
                for child in &children {
                    let status = self.service.has_permission_at_depth(
                        self.ctx,
                        &child.child,
                        requirement,
                        self.depth + 1,
                    )?;
                    if !status.is_allowed() {
                        trace!(child = %child.child, requirement = %requirement, "Child requirement not met");
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }

    /// Primary parent of `node` when there is one and `node` inherits from it
    fn inheriting_parent(&self, node: &NodeRef) -> Result<Option<NodeRef>> {
        if self.parent_requirements.is_empty() {
            return Ok(None);
        }
        let Some(parent) = self
            .service
            .nodes()
            .primary_parent(node)?
            .and_then(|assoc| assoc.parent)
        else {
            return Ok(None);
        };
        if !self.service.store().inherit_parent_permissions(node)? {
            return Ok(None);
        }
        Ok(Some(parent))
    }

    /// Whether the permission itself is granted at `node` or an ancestor it
    /// inherits from, or by a global entry
    pub fn has_single_permission(&self, authorities: &Authorities, node: &NodeRef) -> Result<bool> {
        let key = AccessCacheKey::for_node(
            authorities,
            node,
            &self.required,
            CacheKind::SinglePermissionGlobal,
        );
        if let Some(status) = self.service.cached(&key) {
            return Ok(status.is_allowed());
        }

        if check_global_permissions(self.service.model(), authorities, &self.granters) {
            self.service.remember(key, AccessStatus::Allowed);
            return Ok(true);
        }

        let mut denied = DeniedSet::new();
        self.has_single_permission_at(authorities, node, &mut denied)
    }

    fn has_single_permission_at(
        &self,
        authorities: &Authorities,
        node: &NodeRef,
        denied: &mut DeniedSet,
    ) -> Result<bool> {
        // Denies below this level stop grants from above
        denied.extend(self.denied_at(node)?);

        // Results depend on the denies accumulated on the way up, so only
        // deny-free paths are cached
        let key = denied.is_empty().then(|| {
            AccessCacheKey::for_node(authorities, node, &self.required, CacheKind::SinglePermission)
        });
        if let Some(status) = key.as_ref().and_then(|k| self.service.cached(k)) {
            return Ok(status.is_allowed());
        }

        let allowed = if self.check_required(authorities, node, denied)? {
            true
        } else {
            let parent = self
                .service
                .nodes()
                .primary_parent(node)?
                .and_then(|assoc| assoc.parent);
            match parent {
                Some(parent) if self.service.store().inherit_parent_permissions(node)? => {
                    self.has_single_permission_at(authorities, &parent, denied)?
                }
                _ => false,
            }
        };

        if let Some(key) = key {
            self.service.remember(key, AccessStatus::from_allowed(allowed));
        }
        Ok(allowed)
    }

    /// Every (authority, permission) pair a DENY entry at `node` rules out:
    /// the denied permission, everything granting it and everything it
    /// grants. Denying ALL_PERMISSIONS rules out every permission of the node.
    fn denied_at(&self, node: &NodeRef) -> Result<DeniedSet> {
        let mut denied = DeniedSet::new();
        let Some(entry) = self.service.store().permissions(node)? else {
            return Ok(denied);
        };

        let model = self.service.model();
        let all = model.all_permissions_reference();
        let legacy_all = model.legacy_all_permissions_reference();

        for deny in entry.entries.iter().filter(|e| e.is_denied()) {
            let related = model
                .granting_permissions(&deny.permission)
                .into_iter()
                .chain(model.grantee_permissions(&deny.permission));
            denied.extend(related.map(|p| (deny.authority.clone(), p)));

            if deny.permission == all || deny.permission == legacy_all {
                let available = model.all_permissions_for_node(self.service.nodes(), node)?;
                denied.extend(available.into_iter().map(|p| (deny.authority.clone(), p)));
            }
        }
        Ok(denied)
    }

    fn check_required(
        &self,
        authorities: &Authorities,
        node: &NodeRef,
        denied: &DeniedSet,
    ) -> Result<bool> {
        let Some(entry) = self.service.store().permissions(node)? else {
            return Ok(false);
        };
        Ok(check_entries(
            &entry.entries,
            authorities,
            &self.granters,
            &self.required,
            denied,
        ))
    }
}
