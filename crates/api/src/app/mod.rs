//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/directory/bus wiring behind the stock move service
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Upper bound on a single request, store round-trips included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the full HTTP router from the environment (entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> anyhow::Result<Router> {
    let services = services::build_services().await?;
    Ok(build_app_with(jwt_secret, services))
}

/// Build the router around already-wired services.
pub fn build_app_with(jwt_secret: String, services: services::AppServices) -> Router {
    let jwt = Arc::new(stockflow_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
}
