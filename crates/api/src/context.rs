use rolegate_auth::{Principal, Role};
use rolegate_core::IdentityId;

/// Authenticated caller of a protected route.
///
/// Built by the auth middleware from a verified token; handlers never see a
/// request without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn identity_id(&self) -> &IdentityId {
        &self.principal.identity_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }
}

/// Caller of a public route: anonymous unless a valid token was presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    principal: Option<Principal>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}
