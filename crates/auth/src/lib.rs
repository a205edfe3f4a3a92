//! `rolegate-auth`: pure authorization boundary (zero-trust).
//!
//! Roles, session claims, the profile and audit record shapes, and the
//! declarative policy evaluator. This crate is intentionally decoupled from
//! HTTP, storage and token signing.

pub mod audit;
pub mod authorize;
pub mod claims;
pub mod policy;
pub mod principal;
pub mod profile;
pub mod roles;

pub use audit::{AuditEntry, AuditRecord, ChangeType};
pub use authorize::{AuthzError, require_role};
pub use claims::{
    AuthClaims, SessionClaims, TokenValidationError, check_not_revoked, validate_claims,
};
pub use policy::{Decision, Operation, PolicyInput, Resource, evaluate};
pub use principal::Principal;
pub use profile::{Profile, ProfilePatch, PublicProfile};
pub use roles::Role;
