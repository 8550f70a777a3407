use warden_types::{AclId, NodeRef, PermissionContext};

/// What a check is made against.
///
/// Node targets walk the live parent chain; ACL targets test one
/// pre-flattened list, optionally gated by a store-level list carried in
/// the context.
#[derive(Debug, Clone)]
pub enum EvaluationTarget {
    Node(NodeRef),
    Acl {
        acl: Option<AclId>,
        context: PermissionContext,
    },
}

impl EvaluationTarget {
    pub fn node(node: NodeRef) -> Self {
        Self::Node(node)
    }

    pub fn acl(acl: AclId, context: PermissionContext) -> Self {
        Self::Acl {
            acl: Some(acl),
            context,
        }
    }

    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::Acl { .. } => "acl",
        }
    }
}

impl From<NodeRef> for EvaluationTarget {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}
