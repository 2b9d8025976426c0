//! Reclassification of raw SQLite failures into caller-facing error kinds.

use rusqlite::ErrorCode;
use tracing::error;

use crate::error::StewardError;

/// What a storage failure means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// The current namespace has no ledger tables: no session is selected.
    MissingSchema,
    UniqueViolation,
    Busy,
    Unavailable,
    Other,
}

impl StorageFault {
    pub fn classify(err: &rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, msg) = err {
            match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return Self::Busy,
                ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::ReadOnly => {
                    return Self::Unavailable;
                }
                ErrorCode::ConstraintViolation => {
                    if msg.as_deref().is_some_and(|m| m.contains("UNIQUE")) {
                        return Self::UniqueViolation;
                    }
                }
                _ => {}
            }
        }
        Self::from_message(&err.to_string())
    }

    /// Message-based fallback for errors that surface without an error code
    /// (prepare failures report missing tables only through the message).
    pub fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("no such table")
            || (lower.contains("relation") && lower.contains("does not exist"))
        {
            Self::MissingSchema
        } else if lower.contains("unique constraint failed") {
            Self::UniqueViolation
        } else if lower.contains("database is locked") || lower.contains("database is busy") {
            Self::Busy
        } else if lower.contains("unable to open database") {
            Self::Unavailable
        } else {
            Self::Other
        }
    }
}

impl From<rusqlite::Error> for StewardError {
    fn from(err: rusqlite::Error) -> Self {
        storage_err("storage operation", err)
    }
}

/// Converts a SQLite error raised while doing `context` into a `StewardError`.
pub(crate) fn storage_err(context: &str, err: rusqlite::Error) -> StewardError {
    match StorageFault::classify(&err) {
        StorageFault::MissingSchema => StewardError::no_active_session(),
        StorageFault::UniqueViolation => StewardError::Conflict(format!("{}: {}", context, err)),
        StorageFault::Busy => {
            StewardError::StorageUnavailable(format!("{}: storage is busy, retry", context))
        }
        StorageFault::Unavailable => {
            StewardError::StorageUnavailable(format!("{}: namespace unreachable", context))
        }
        StorageFault::Other => {
            error!(context, error = %err, "Unexpected storage failure");
            StewardError::Internal(format!("{}: {}", context, err))
        }
    }
}
