use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::error::ApiError;

/// The caller behind a request that passed [`require_session`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
    pub token: String,
}

/// Resolve the bearer token to a live session. Anything else is a 401.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let username = state
        .sessions
        .authenticate(&token)
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut()
        .insert(AuthenticatedUser { username, token });
    Ok(next.run(req).await)
}
