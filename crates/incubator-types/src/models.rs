use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A simulated incubator owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub user_id: i64,
    pub serial_number: String,
}

/// A reading that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub serial_number: String,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
}

/// A persisted reading. Temperature is in °C, humidity in percent.
///
/// `serial_number` is not a foreign key: readings may outlive or precede
/// the device row they refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub serial_number: String,
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
}
