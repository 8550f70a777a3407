//! # Warden Constants
//!
//! Centralized constants used across the Warden permission engine.
//! This crate provides a single source of truth for well-known permission
//! names, authority markers and engine limits.

// ============================================================================
// Namespace Constants
// ============================================================================

/// Namespace URI of the security model.
///
/// Used by:
/// - ALL_PERMISSIONS marker (owning type `sys:base`)
/// - Default permission model fixture
pub const SECURITY_MODEL_URI: &str = "http://www.alfresco.org/model/system/1.0";

/// Prefix conventionally bound to [`SECURITY_MODEL_URI`]
pub const SECURITY_MODEL_PREFIX: &str = "sys";

/// Local name of the base type that owns the ALL_PERMISSIONS marker
pub const BASE_TYPE_NAME: &str = "base";

// ============================================================================
// Permission Names
// ============================================================================

/// Universal permission marker. Granting it grants every permission.
pub const ALL_PERMISSIONS: &str = "All";

/// Full control group; its node requirements stand in for ALL_PERMISSIONS
pub const FULL_CONTROL: &str = "FullControl";

pub const READ: &str = "Read";
pub const WRITE: &str = "Write";
pub const DELETE: &str = "Delete";
pub const ADD_CHILDREN: &str = "AddChildren";
pub const READ_PERMISSIONS: &str = "ReadPermissions";
pub const CHANGE_PERMISSIONS: &str = "ChangePermissions";

// ============================================================================
// Authority Constants
// ============================================================================

/// Authority every authenticated principal belongs to
pub const GROUP_EVERYONE: &str = "GROUP_EVERYONE";

/// Authority name prefix for groups
pub const GROUP_PREFIX: &str = "GROUP_";

/// Authority name prefix for roles
pub const ROLE_PREFIX: &str = "ROLE_";

/// Dynamic authority granted to the owner of a node
pub const ROLE_OWNER: &str = "ROLE_OWNER";

/// Role carried by administrators
pub const ROLE_ADMINISTRATOR: &str = "ROLE_ADMINISTRATOR";

/// Authority of the guest principal. A user whose name matches it
/// case-insensitively also holds it verbatim.
///
/// Used by:
/// - Authorization context builder
pub const GUEST_AUTHORITY: &str = "guest";

/// Name of the system principal; checks made as this user always succeed
pub const SYSTEM_USER_NAME: &str = "System";

// ============================================================================
// Engine Limits
// ============================================================================

/// Maximum nesting of node requirement expansion before evaluation is
/// treated as a configuration error (cyclic permission model)
pub const MAX_REQUIREMENT_DEPTH: usize = 50;

// ============================================================================
// Cache Defaults
// ============================================================================

/// Default maximum number of cached access decisions
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-live for cached access decisions, in seconds
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

// ============================================================================
// Method Guard Attributes
// ============================================================================

/// Config attribute prefixes understood by the method guard
pub mod attributes {
    pub const ACL_NODE: &str = "ACL_NODE";
    pub const ACL_PARENT: &str = "ACL_PARENT";
    pub const ACL_ALLOW: &str = "ACL_ALLOW";
    pub const ACL_DENY: &str = "ACL_DENY";
    pub const ACL_METHOD: &str = "ACL_METHOD";
}
