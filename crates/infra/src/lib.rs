//! Infrastructure layer: stores, identity provider, the access protocols and
//! their wiring.
//!
//! - `profile_store` / `audit_store`: storage ports with in-memory and Postgres adapters
//! - `identity`: identity provider port and a signed-token in-memory provider
//! - `claims_issuer`, `revocation`, `audit_recorder`, `lifecycle`: the access protocols
//! - `gateway`: policy-guarded data access
//! - `service`: the API surface and component wiring

pub mod alerts;
pub mod audit_recorder;
pub mod audit_store;
pub mod claims_issuer;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod profile_store;
pub mod retry;
pub mod revocation;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use alerts::{AlertKind, AlertSink, InMemoryAlertSink, LoggingAlertSink, OperationalAlert};
pub use claims_issuer::{ClaimsIssuer, RoleGrant};
pub use config::Config;
pub use error::{AccessError, AccessResult};
pub use identity::{
    IdentityEventEnvelope, IdentityProvider, IdentityProviderError, InMemoryIdentityProvider,
    IssuedToken, TokenSigner,
};
pub use lifecycle::{LifecycleOrchestrator, LifecycleWorker, WorkerHandle};
pub use retry::RetryPolicy;
pub use service::{AccessService, Backends, CallPolicies, LogoutResult, Wiring};
