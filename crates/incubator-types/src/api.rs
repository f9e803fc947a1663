use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Device, Reading};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    // Absent fields read as empty and are rejected by the credential store.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub username: String,
    pub token: String,
}

/// The generated password is only ever shown in this response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetPasswordResponse {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Devices --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddDeviceRequest {
    pub serial_number: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: String,
    pub devices: Vec<Device>,
}

// -- Readings --

/// Query string for `GET /readings`. Hours are an inclusive hour-of-day window.
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub hour_from: Option<u32>,
    pub hour_to: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadingsResponse {
    pub readings: Vec<Reading>,
    pub total: usize,
}
