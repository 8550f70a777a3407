use std::collections::BTreeSet;

use warden_model::PermissionModel;
use warden_observe::logging::{eval_span, record_eval_result};
use warden_observe::metrics::record_evaluation;
use warden_store::PermissionStore;
use warden_types::{AclId, Authorities, PermissionReference, QName, RequirementScope};

use super::{
    check_depth, check_entries, check_global_permissions, granters_for, node_requirements_for,
    DeniedSet,
};
use crate::{EvalError, Result};

/// Evaluates one permission against a flattened access control list
///
/// An ACL carries no parent or children context, so a permission whose
/// model declares parent or children requirements cannot be evaluated and
/// construction fails.
pub struct AclEvaluator<'a> {
    model: &'a dyn PermissionModel,
    store: &'a dyn PermissionStore,
    required: PermissionReference,
    type_qname: QName,
    aspects: BTreeSet<QName>,
    node_requirements: BTreeSet<PermissionReference>,
    granters: BTreeSet<PermissionReference>,
    depth: usize,
}

impl<'a> AclEvaluator<'a> {
    pub fn new(
        model: &'a dyn PermissionModel,
        store: &'a dyn PermissionStore,
        required: PermissionReference,
        type_qname: QName,
        aspects: BTreeSet<QName>,
    ) -> Result<Self> {
        Self::at_depth(model, store, required, type_qname, aspects, 0)
    }

    fn at_depth(
        model: &'a dyn PermissionModel,
        store: &'a dyn PermissionStore,
        required: PermissionReference,
        type_qname: QName,
        aspects: BTreeSet<QName>,
        depth: usize,
    ) -> Result<Self> {
        check_depth(&required, depth)?;

        for (scope, label) in [
            (RequirementScope::Parent, "parent"),
            (RequirementScope::Children, "children"),
        ] {
            if !model
                .required_permissions(&required, &type_qname, &aspects, scope)
                .is_empty()
            {
                return Err(EvalError::Configuration(format!(
                    "{label} requirements of {required} cannot be checked against an ACL"
                )));
            }
        }

        let node_requirements = node_requirements_for(model, &required, &type_qname, &aspects);
        let granters = granters_for(model, &required);

        Ok(Self {
            model,
            store,
            required,
            type_qname,
            aspects,
            node_requirements,
            granters,
            depth,
        })
    }

    pub fn required(&self) -> &PermissionReference {
        &self.required
    }

    /// Whether `authorities` hold the permission under `acl`
    pub fn evaluate(&self, authorities: &Authorities, acl: AclId) -> Result<bool> {
        let span = eval_span(self.required.name(), self.depth);
        let _guard = span.enter();
        if self.depth == 0 {
            record_evaluation("acl");
        }

        let result = self.evaluate_requirements(authorities, acl)?;
        record_eval_result(&span, result);
        Ok(result)
    }

    fn evaluate_requirements(&self, authorities: &Authorities, acl: AclId) -> Result<bool> {
        if self.model.check_permission(&self.required)
            && !self.has_single_permission(authorities, acl)?
        {
            return Ok(false);
        }

        for requirement in &self.node_requirements {
            let nested = Self::at_depth(
                self.model,
                self.store,
                requirement.clone(),
                self.type_qname.clone(),
                self.aspects.clone(),
                self.depth + 1,
            )?;
            if !nested.evaluate(authorities, acl)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn has_single_permission(&self, authorities: &Authorities, acl: AclId) -> Result<bool> {
        if check_global_permissions(self.model, authorities, &self.granters) {
            return Ok(true);
        }
        self.check_required(authorities, acl)
    }

    /// An unknown ACL grants nothing
    fn check_required(&self, authorities: &Authorities, acl: AclId) -> Result<bool> {
        let Some(list) = self.store.access_control_list(acl)? else {
            return Ok(false);
        };

        // Denies recorded here only live for this scan
        let denied: DeniedSet = list
            .entries
            .iter()
            .filter(|e| e.is_denied())
            .map(|e| (e.authority.clone(), e.permission.clone()))
            .collect();

        Ok(check_entries(
            &list.entries,
            authorities,
            &self.granters,
            &self.required,
            &denied,
        ))
    }
}
