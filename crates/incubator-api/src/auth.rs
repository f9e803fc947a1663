use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use incubator_auth::{AuthError, CredentialStore, SessionGuard};
use incubator_db::Database;
use incubator_types::api::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, ResetPasswordResponse,
};

use crate::error::{ApiError, blocking};
use crate::middleware::AuthenticatedUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub credentials: CredentialStore,
    pub sessions: SessionGuard,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, sessions: SessionGuard) -> Self {
        Self {
            credentials: CredentialStore::new(db.clone()),
            db,
            sessions,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.clone();
    let result = blocking(move || {
        credentials.register_with_devices(&req.username, &req.password, &req.serial_numbers)
    })
    .await?;

    match result {
        Ok(user_id) => Ok((StatusCode::CREATED, Json(RegisterResponse { user_id }))),
        Err(AuthError::DuplicateUsername | AuthError::DuplicateSerialNumber) => {
            Err(ApiError::RegistrationFailed)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.clone();
    let username = req.username.clone();
    let result = blocking(move || credentials.login(&req.username, &req.password)).await?;

    match result {
        Ok(true) => {
            let token = state.sessions.establish(&username);
            Ok(Json(LoginResponse { username, token }))
        }
        Ok(false) => Err(ApiError::InvalidLogin),
        // A corrupt row must look like any other failed login from outside.
        Err(AuthError::InvalidCredentialFormat) => {
            error!("Login refused for {}: stored credential unreadable", username);
            Err(ApiError::InvalidLogin)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> StatusCode {
    state.sessions.revoke(&user.token);
    info!("{} logged out", user.username);
    StatusCode::NO_CONTENT
}

/// Rotate the caller's password. Every session they hold, including this
/// one, is ended.
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.clone();
    let username = user.username.clone();
    let generated = blocking(move || credentials.reset_password(&username)).await??;

    let revoked = state.sessions.revoke_user(&user.username);
    info!("Revoked {} sessions for {} after reset", revoked, user.username);

    Ok(Json(ResetPasswordResponse {
        password: generated.into_plaintext(),
    }))
}
