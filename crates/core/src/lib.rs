//! `rolegate-core`: identifiers and the error model shared by every layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AuditRecordId, IdentityId, SYSTEM_ACTOR, TokenId};
