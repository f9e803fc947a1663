pub mod api;
pub mod models;

/// Text form used for every persisted reading timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
