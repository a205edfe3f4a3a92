//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: component wiring (stores, identity provider, lifecycle worker)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use rolegate_infra::AccessService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(service: Arc<AccessService>) -> Router {
    let auth_state = middleware::AuthState {
        service: service.clone(),
    };

    // Protected routes: a valid bearer token is required.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::auth_middleware,
    ));

    // Public routes: anonymous callers are evaluated by the policy.
    let public = routes::public_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::optional_auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/session/refresh", post(routes::session::refresh))
        .merge(protected)
        .merge(public)
        .layer(ServiceBuilder::new().layer(Extension(service)))
}
