//! Who is asking: the authenticated principal and any run-as elevation.

use std::collections::BTreeSet;

use warden_const::SYSTEM_USER_NAME;

/// An authenticated principal and the authorities granted at login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub username: String,
    pub granted_authorities: BTreeSet<String>,
}

impl Authentication {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            granted_authorities: BTreeSet::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_USER_NAME)
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.granted_authorities.insert(authority.into());
        self
    }

    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_USER_NAME
    }
}

/// Security state passed explicitly into every check.
///
/// Elevation produces a new value, so the caller's context can never be
/// left elevated after a probe.
#[derive(Debug, Clone, Default)]
pub struct SecurityContext {
    authentication: Option<Authentication>,
    run_as: Option<Authentication>,
}

impl SecurityContext {
    /// No principal; every check is DENIED
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(authentication: Authentication) -> Self {
        Self {
            authentication: Some(authentication),
            run_as: None,
        }
    }

    pub fn user(username: impl Into<String>) -> Self {
        Self::authenticated(Authentication::new(username))
    }

    pub fn system() -> Self {
        Self::authenticated(Authentication::system())
    }

    /// A copy of this context acting as `principal`
    pub fn run_as(&self, principal: Authentication) -> Self {
        Self {
            authentication: self.authentication.clone(),
            run_as: Some(principal),
        }
    }

    pub fn run_as_system(&self) -> Self {
        self.run_as(Authentication::system())
    }

    /// The principal checks are made for: the run-as principal if set
    pub fn effective(&self) -> Option<&Authentication> {
        self.run_as.as_ref().or(self.authentication.as_ref())
    }

    /// The principal that actually authenticated
    pub fn current(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }

    pub fn effective_user_name(&self) -> Option<&str> {
        self.effective().map(|a| a.username.as_str())
    }

    pub fn current_user_name(&self) -> Option<&str> {
        self.current().map(|a| a.username.as_str())
    }
}
