use thiserror::Error;

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: requires role '{0}'")]
    Forbidden(Role),
}

/// Require the principal's claimed role to be at least `required`.
///
/// - No IO
/// - No panics
/// - Reads only the signed claim
pub fn require_role(principal: &Principal, required: Role) -> Result<(), AuthzError> {
    match required {
        Role::Standard => Ok(()),
        Role::Elevated if principal.is_elevated() => Ok(()),
        Role::Elevated => Err(AuthzError::Forbidden(required)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rolegate_core::{IdentityId, TokenId};

    fn principal(role: Role) -> Principal {
        let now = Utc::now();
        Principal {
            identity_id: IdentityId::new("p-1").unwrap(),
            role,
            token_id: TokenId::new(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn elevated_satisfies_both_roles() {
        let p = principal(Role::Elevated);
        assert!(require_role(&p, Role::Elevated).is_ok());
        assert!(require_role(&p, Role::Standard).is_ok());
    }

    #[test]
    fn standard_cannot_act_as_elevated() {
        let p = principal(Role::Standard);
        assert_eq!(
            require_role(&p, Role::Elevated),
            Err(AuthzError::Forbidden(Role::Elevated))
        );
        assert!(require_role(&p, Role::Standard).is_ok());
    }
}
