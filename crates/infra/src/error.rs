//! Caller-facing error for every access-control operation.

use thiserror::Error;

use rolegate_auth::AuthzError;
use rolegate_core::{DomainError, ErrorKind};

use crate::identity::IdentityProviderError;
use crate::profile_store::StoreError;

/// Errors returned by the access API.
///
/// Display strings are what callers see: no internal detail and nothing
/// about other identities' data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid role '{0}': expected 'elevated' or 'standard'")]
    InvalidRole(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("target identity not found")]
    TargetNotFound,

    #[error("not found")]
    NotFound,

    #[error("the last elevated identity cannot give up its own privileges")]
    LastPrivilegedActorProtected,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("a downstream service is unavailable, retry later")]
    Unavailable,

    #[error("internal error")]
    Internal,
}

pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Unauthenticated => ErrorKind::Unauthenticated,
            AccessError::PermissionDenied => ErrorKind::PermissionDenied,
            AccessError::InvalidRole(_) | AccessError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            AccessError::TargetNotFound | AccessError::NotFound => ErrorKind::NotFound,
            AccessError::LastPrivilegedActorProtected | AccessError::Conflict(_) => {
                ErrorKind::Conflict
            }
            AccessError::Unavailable => ErrorKind::Unavailable,
            AccessError::Internal => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => AccessError::Unavailable,
            StoreError::NotFound => AccessError::NotFound,
            StoreError::Conflict(msg) => AccessError::Conflict(msg),
            StoreError::Backend(_) => AccessError::Internal,
        }
    }
}

impl From<IdentityProviderError> for AccessError {
    fn from(e: IdentityProviderError) -> Self {
        match e {
            IdentityProviderError::TokenExpired | IdentityProviderError::TokenInvalid(_) => {
                AccessError::Unauthenticated
            }
            IdentityProviderError::NotFound => AccessError::NotFound,
            IdentityProviderError::AlreadyExists => {
                AccessError::Conflict("identity already exists".to_string())
            }
            IdentityProviderError::Unavailable(_) | IdentityProviderError::Timeout(_) => {
                AccessError::Unavailable
            }
        }
    }
}

impl From<DomainError> for AccessError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                AccessError::InvalidArgument(msg)
            }
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => {
                AccessError::Conflict(msg)
            }
            DomainError::NotFound => AccessError::NotFound,
            DomainError::Unauthorized => AccessError::PermissionDenied,
        }
    }
}

impl From<AuthzError> for AccessError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::Forbidden(_) => AccessError::PermissionDenied,
        }
    }
}
