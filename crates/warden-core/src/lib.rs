//! # Warden Core - Permission Evaluation Engine
//!
//! Decides whether the current principal holds a permission on a node or
//! against a flattened access control list. Node checks walk the primary
//! parent chain with inheritance and deny accumulation; ACL checks test a
//! single pre-resolved list. Decisions are cached until the next mutation.

use thiserror::Error;

pub mod authority;
pub mod dynamic;
pub mod evaluator;
pub mod security;
pub mod service;
pub mod target;
pub mod voter;

pub use authority::{AuthorityResolver, AuthorizationContextBuilder, InMemoryAuthorityResolver};
pub use dynamic::{DynamicAuthority, OwnerDynamicAuthority};
pub use evaluator::{AclEvaluator, NodeEvaluator};
pub use security::{Authentication, SecurityContext};
pub use service::PermissionService;
pub use target::EvaluationTarget;
pub use voter::{AclEntryVoter, ConfigAttribute, MethodArgument, Vote};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Store error: {0}")]
    Store(#[from] warden_types::StoreError),

    #[error("Model error: {0}")]
    Model(#[from] warden_model::ModelError),

    /// The permission model cannot be evaluated in this context
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),

    #[error("Invalid config attribute: {0}")]
    ConfigAttribute(String),

    #[error("Access denied")]
    AccessDenied,
}

pub type Result<T> = std::result::Result<T, EvalError>;
