//! Permission evaluators
//!
//! [`NodeEvaluator`] walks the live primary-parent chain, expanding
//! requirements on the node, its parent and its children. [`AclEvaluator`]
//! tests a single flattened list and accepts node requirements only.

use std::collections::{BTreeSet, HashSet};

use warden_const::{BASE_TYPE_NAME, FULL_CONTROL, MAX_REQUIREMENT_DEPTH, SECURITY_MODEL_URI};
use warden_model::PermissionModel;
use warden_types::{
    Authorities, PermissionEntry, PermissionReference, QName, RequirementScope,
};

use crate::{EvalError, Result};

mod acl;
mod node;

pub use acl::AclEvaluator;
pub use node::NodeEvaluator;

/// (authority, permission) pairs that may no longer grant
pub(crate) type DeniedSet = HashSet<(String, PermissionReference)>;

/// The fallback type when an ACL context names none
pub(crate) fn base_type() -> QName {
    QName::new(SECURITY_MODEL_URI, BASE_TYPE_NAME)
}

/// Everything that grants `required`, always including both
/// ALL_PERMISSIONS references
fn granters_for(model: &dyn PermissionModel, required: &PermissionReference) -> BTreeSet<PermissionReference> {
    let mut granters = model.granting_permissions(required);
    granters.insert(model.all_permissions_reference());
    granters.insert(model.legacy_all_permissions_reference());
    granters
}

/// NODE-scope requirements. ALL_PERMISSIONS takes those of FullControl.
fn node_requirements_for(
    model: &dyn PermissionModel,
    required: &PermissionReference,
    type_qname: &QName,
    aspects: &BTreeSet<QName>,
) -> BTreeSet<PermissionReference> {
    if *required == model.all_permissions_reference() {
        return model
            .permission_reference(None, FULL_CONTROL)
            .map(|full_control| {
                model.required_permissions(&full_control, type_qname, aspects, RequirementScope::Node)
            })
            .unwrap_or_default();
    }
    model.required_permissions(required, type_qname, aspects, RequirementScope::Node)
}

fn check_depth(required: &PermissionReference, depth: usize) -> Result<()> {
    if depth > MAX_REQUIREMENT_DEPTH {
        return Err(EvalError::Configuration(format!(
            "requirements of {required} nest deeper than {MAX_REQUIREMENT_DEPTH} levels"
        )));
    }
    Ok(())
}

/// Whether the entry applies to one of the authorities and to a granter
fn matches(
    entry: &PermissionEntry,
    authorities: &Authorities,
    granters: &BTreeSet<PermissionReference>,
) -> bool {
    authorities.contains(&entry.authority) && granters.contains(&entry.permission)
}

/// An ALLOW entry that matches and has not been denied for `required`
fn is_granted(
    entry: &PermissionEntry,
    authorities: &Authorities,
    granters: &BTreeSet<PermissionReference>,
    required: &PermissionReference,
    denied: &DeniedSet,
) -> bool {
    entry.is_allowed()
        && matches(entry, authorities, granters)
        && !denied.contains(&(entry.authority.clone(), required.clone()))
}

/// Scan denies first: a matching deny fails the whole list
fn check_entries(
    entries: &[PermissionEntry],
    authorities: &Authorities,
    granters: &BTreeSet<PermissionReference>,
    required: &PermissionReference,
    denied: &DeniedSet,
) -> bool {
    if entries
        .iter()
        .any(|e| e.is_denied() && matches(e, authorities, granters))
    {
        return false;
    }
    entries
        .iter()
        .any(|e| is_granted(e, authorities, granters, required, denied))
}

fn check_global_permissions(
    model: &dyn PermissionModel,
    authorities: &Authorities,
    granters: &BTreeSet<PermissionReference>,
) -> bool {
    model
        .global_permission_entries()
        .iter()
        .any(|e| e.is_allowed() && matches(e, authorities, granters))
}
