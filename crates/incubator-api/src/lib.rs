pub mod auth;
pub mod devices;
pub mod error;
pub mod middleware;
pub mod readings;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// All routes, with the session gate in front of the protected ones.
/// Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/profile", get(devices::profile))
        .route("/devices", post(devices::add_device))
        .route("/readings", get(readings::get_readings))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
