use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use incubator_types::api::{AddDeviceRequest, ProfileResponse};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};
use crate::middleware::AuthenticatedUser;

pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.clone();
    let username = user.username.clone();
    let devices = blocking(move || credentials.devices(&username)).await??;

    Ok(Json(ProfileResponse {
        username: user.username,
        devices,
    }))
}

pub async fn add_device(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<AddDeviceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state.credentials.clone();
    let device =
        blocking(move || credentials.add_device(&user.username, &req.serial_number)).await??;

    Ok((StatusCode::CREATED, Json(device)))
}
