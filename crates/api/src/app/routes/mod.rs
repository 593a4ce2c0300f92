use axum::{Router, routing::get};

pub mod balances;
pub mod moves;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/moves", moves::router())
        .nest("/balances", balances::router())
}
