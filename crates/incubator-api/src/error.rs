use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use incubator_auth::AuthError;
use incubator_db::DbError;
use incubator_types::api::ErrorResponse;

/// Errors as the client sees them. Messages never say whether a username
/// exists or which half of a login was wrong.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Registration failed. Please try again.")]
    RegistrationFailed,

    #[error("Invalid username or password.")]
    InvalidLogin,

    #[error("Authentication required.")]
    Unauthorized,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Serial number already registered.")]
    SerialTaken,

    #[error("Internal server error.")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::RegistrationFailed | ApiError::MissingField(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidLogin | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::SerialTaken => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DuplicateUsername => ApiError::RegistrationFailed,
            AuthError::DuplicateSerialNumber => ApiError::SerialTaken,
            AuthError::MissingField(field) => ApiError::MissingField(field),
            // The session outlived its user row.
            AuthError::UserNotFound => ApiError::Unauthorized,
            other => {
                error!("Request failed: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        error!("Request failed: {}", err);
        ApiError::Internal
    }
}

/// Run blocking storage work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })
}
