use incubator_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username already registered")]
    DuplicateUsername,

    #[error("serial number already registered")]
    DuplicateSerialNumber,

    #[error("user not found")]
    UserNotFound,

    /// The stored credential does not decode to `hash:salt`. Indicates corruption.
    #[error("stored credential is malformed")]
    InvalidCredentialFormat,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
