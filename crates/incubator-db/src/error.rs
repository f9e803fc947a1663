use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE constraint rejected the write. `column` is `table.column`.
    #[error("unique constraint failed: {column}")]
    UniqueViolation { column: String },

    #[error("database busy: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("timed out after {0:?} waiting for a {1} connection")]
    LockTimeout(Duration, &'static str),

    #[error("table `{table}` has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        table: &'static str,
        expected: Vec<&'static str>,
        found: Vec<String>,
    },

    /// Column names match but storage would not enforce the listed constraints.
    #[error("table `{table}` enforces {found:?}, expected at least {expected:?}")]
    MissingConstraints {
        table: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("invalid timestamp `{0}` in readings table")]
    InvalidTimestamp(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl DbError {
    /// Contention errors that are expected to clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::LockTimeout(..))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let (code, extended) = match &err {
            rusqlite::Error::SqliteFailure(e, _) => (Some(e.code), e.extended_code),
            _ => (None, 0),
        };

        match code {
            Some(ErrorCode::ConstraintViolation)
                if extended == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                let column = match &err {
                    rusqlite::Error::SqliteFailure(_, Some(msg)) => msg
                        .strip_prefix("UNIQUE constraint failed: ")
                        .unwrap_or(msg)
                        .to_string(),
                    _ => String::new(),
                };
                DbError::UniqueViolation { column }
            }
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => DbError::Busy(err),
            _ => DbError::Sqlite(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
