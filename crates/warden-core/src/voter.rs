//! Declarative method guard
//!
//! A guarded call lists config attributes such as
//! `ACL_NODE.0.sys:base.Read` next to its typed arguments; the voter
//! resolves each attribute to a node and checks the permission through the
//! [`PermissionService`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;
use warden_const::attributes::{ACL_ALLOW, ACL_DENY, ACL_METHOD, ACL_NODE, ACL_PARENT};
use warden_model::resolve_qname;
use warden_types::{AccessStatus, ChildAssociation, NodeRef, PermissionKey, QName, StoreRef};

use crate::security::SecurityContext;
use crate::service::PermissionService;
use crate::{EvalError, Result};

/// Outcome of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Granted,
    Denied,
    /// The voter has no opinion on this call
    Abstain,
}

/// A guarded call's argument, as far as the voter can use it
#[derive(Debug, Clone)]
pub enum MethodArgument {
    Node(Option<NodeRef>),
    /// Checked against the store's root node
    Store(Option<StoreRef>),
    ChildAssociation(Option<ChildAssociation>),
    Other,
}

/// A parsed guard attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAttribute {
    /// The permission must hold on the node named by an argument
    Node { parameter: usize, permission: PermissionKey },
    /// The permission must hold on the argument's primary parent
    Parent { parameter: usize, permission: PermissionKey },
    Allow,
    Deny,
    /// The caller must be, or hold, the authority
    Method { authority: String },
}

impl ConfigAttribute {
    /// Whether the voter understands the attribute at all
    pub fn supports(attribute: &str) -> bool {
        [ACL_NODE, ACL_PARENT, ACL_ALLOW, ACL_DENY, ACL_METHOD]
            .iter()
            .any(|prefix| attribute.starts_with(prefix))
    }

    /// Parse an attribute, resolving `prefix:type` with `namespaces`
    pub fn parse(attribute: &str, namespaces: &BTreeMap<String, String>) -> Result<Self> {
        let invalid = |reason: &str| EvalError::ConfigAttribute(format!("{attribute}: {reason}"));
        let tokens: Vec<&str> = attribute.split('.').filter(|t| !t.is_empty()).collect();

        match tokens.as_slice() {
            [kind] if *kind == ACL_ALLOW => Ok(Self::Allow),
            [kind] if *kind == ACL_DENY => Ok(Self::Deny),
            [kind, authority] if *kind == ACL_METHOD => Ok(Self::Method {
                authority: authority.to_string(),
            }),
            [kind, ..] if *kind == ACL_METHOD => Err(invalid("expected ACL_METHOD.<authority>")),
            [kind, parameter, class, name] if *kind == ACL_NODE || *kind == ACL_PARENT => {
                let parameter = parameter
                    .parse::<usize>()
                    .map_err(|_| invalid("argument index is not a number"))?;
                let qname = resolve_qname(namespaces, class).map_err(|e| invalid(&e.to_string()))?;
                let permission = PermissionKey {
                    qname,
                    name: name.to_string(),
                };
                if *kind == ACL_NODE {
                    Ok(Self::Node {
                        parameter,
                        permission,
                    })
                } else {
                    Ok(Self::Parent {
                        parameter,
                        permission,
                    })
                }
            }
            [kind, ..] if *kind == ACL_NODE || *kind == ACL_PARENT => {
                Err(invalid("expected <kind>.<arg>.<prefix:type>.<permission>"))
            }
            _ => Err(invalid("unsupported attribute")),
        }
    }
}

/// Votes on guarded calls using node permissions
pub struct AclEntryVoter {
    service: Arc<PermissionService>,
    namespaces: BTreeMap<String, String>,
    abstain_for: BTreeSet<QName>,
}

impl AclEntryVoter {
    pub fn new(service: Arc<PermissionService>, namespaces: BTreeMap<String, String>) -> Self {
        Self {
            service,
            namespaces,
            abstain_for: BTreeSet::new(),
        }
    }

    /// Abstain whenever the tested node has this type or aspect
    pub fn abstain_for(mut self, class: QName) -> Self {
        self.abstain_for.insert(class);
        self
    }

    pub fn vote(
        &self,
        ctx: &SecurityContext,
        args: &[MethodArgument],
        attributes: &[&str],
    ) -> Result<Vote> {
        if ctx.effective().is_some_and(|auth| auth.is_system()) {
            return Ok(Vote::Granted);
        }

        let supported = attributes
            .iter()
            .filter(|a| ConfigAttribute::supports(a))
            .map(|a| ConfigAttribute::parse(a, &self.namespaces))
            .collect::<Result<Vec<_>>>()?;
        if supported.is_empty() {
            return Ok(Vote::Granted);
        }

        // None until an ACL_METHOD attribute is seen
        let mut method_entry: Option<bool> = None;

        for attribute in &supported {
            let (parameter, permission, parent) = match attribute {
                ConfigAttribute::Deny => return Ok(Vote::Denied),
                ConfigAttribute::Allow => return Ok(Vote::Granted),
                ConfigAttribute::Method { authority } => {
                    let held = method_entry.unwrap_or(false) || self.holds(ctx, authority)?;
                    method_entry = Some(held);
                    continue;
                }
                ConfigAttribute::Node {
                    parameter,
                    permission,
                } => (*parameter, permission, false),
                ConfigAttribute::Parent {
                    parameter,
                    permission,
                } => (*parameter, permission, true),
            };

            let Some(arg) = args.get(parameter) else {
                continue;
            };
            let Some(node) = self.target_node(arg, parent)? else {
                continue;
            };

            if self.abstains(&node)? {
                return Ok(Vote::Abstain);
            }

            let reference = self
                .service
                .model()
                .permission_reference(Some(&permission.qname), &permission.name)
                .ok_or_else(|| EvalError::UnknownPermission(permission.name.clone()))?;
            if self.service.has_permission_ref(ctx, &node, &reference)? == AccessStatus::Denied {
                debug!(node = %node, permission = %reference, "Guard denied");
                return Ok(Vote::Denied);
            }
        }

        Ok(match method_entry {
            Some(false) => Vote::Denied,
            _ => Vote::Granted,
        })
    }

    /// Run `f` unless the vote is Denied
    pub fn guard<T>(
        &self,
        ctx: &SecurityContext,
        args: &[MethodArgument],
        attributes: &[&str],
        f: impl FnOnce() -> T,
    ) -> Result<T> {
        match self.vote(ctx, args, attributes)? {
            Vote::Denied => Err(EvalError::AccessDenied),
            Vote::Granted | Vote::Abstain => Ok(f()),
        }
    }

    fn holds(&self, ctx: &SecurityContext, authority: &str) -> Result<bool> {
        if ctx.effective_user_name() == Some(authority) {
            return Ok(true);
        }
        let authorities = self
            .service
            .authorization_context()
            .for_node(ctx.effective(), None)?;
        Ok(authorities.contains(authority))
    }

    fn target_node(&self, arg: &MethodArgument, parent: bool) -> Result<Option<NodeRef>> {
        let nodes = self.service.nodes();
        match (arg, parent) {
            (MethodArgument::Node(node), false) => Ok(node.clone()),
            (MethodArgument::Store(Some(store)), false) => Ok(Some(nodes.root_node(store)?)),
            (MethodArgument::Store(None), false) => Ok(None),
            (MethodArgument::ChildAssociation(assoc), false) => {
                Ok(assoc.as_ref().map(|a| a.child.clone()))
            }
            (MethodArgument::Node(Some(child)), true) => {
                Ok(nodes.primary_parent(child)?.and_then(|a| a.parent))
            }
            (MethodArgument::Node(None), true) => Ok(None),
            (MethodArgument::ChildAssociation(assoc), true) => {
                Ok(assoc.as_ref().and_then(|a| a.parent.clone()))
            }
            (MethodArgument::Store(_), true) => Err(EvalError::ConfigAttribute(
                "ACL_PARENT cannot be applied to a store argument".to_string(),
            )),
            (MethodArgument::Other, _) => Err(EvalError::ConfigAttribute(
                "argument is not a node, store or child association".to_string(),
            )),
        }
    }

    fn abstains(&self, node: &NodeRef) -> Result<bool> {
        if self.abstain_for.is_empty() {
            return Ok(false);
        }
        let nodes = self.service.nodes();
        if self.abstain_for.contains(&nodes.node_type(node)?) {
            return Ok(true);
        }
        Ok(nodes
            .aspects(node)?
            .iter()
            .any(|aspect| self.abstain_for.contains(aspect)))
    }
}
