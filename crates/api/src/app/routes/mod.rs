use axum::{
    Router,
    routing::{get, post},
};

pub mod audit;
pub mod collections;
pub mod policy;
pub mod profiles;
pub mod roles;
pub mod session;
pub mod system;

/// Router for endpoints that require an authenticated caller.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(session::whoami))
        .route("/session/logout", post(session::logout))
        .route("/roles/grant", post(roles::grant_role))
        .route("/profile", get(profiles::get_own).patch(profiles::update_own))
        .route("/profiles/:id", get(profiles::get).patch(profiles::update))
        .route("/profiles/:id/deactivate", post(profiles::deactivate))
        .route("/profiles/:id/reactivate", post(profiles::reactivate))
        .route("/audit", get(audit::list))
        .route("/policy/explain", get(policy::explain))
}

/// Router for endpoints that also serve anonymous callers.
pub fn public_router() -> Router {
    Router::new()
        .route(
            "/collections/:collection",
            get(collections::list).post(collections::create),
        )
        .route(
            "/collections/:collection/:id",
            get(collections::read)
                .patch(collections::update)
                .delete(collections::delete),
        )
}
