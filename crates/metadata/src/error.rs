//! Metadata store error types.
//!
//! Every backend reports unique-constraint violations, lock contention and
//! missing rows differently. Errors coming out of the store are normalised
//! into [`MetadataError`] with a closed [`ErrorKind`], and calling code is
//! expected to branch through [`is_duplicate_key_error`],
//! [`is_not_found_error`] and [`is_deadlock_error`] rather than matching on
//! driver error types.

use crate::dialect::{Dialect, MySql, Postgres, Sqlite};
use sqlx::error::DatabaseError;
use sqlx::sqlite::SqliteError;
use thiserror::Error;

/// Portable error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    /// Deadlock, serialization failure, lock wait timeout or a busy/locked database.
    Deadlock,
    MismatchedInputLengths,
    UnsupportedDriver,
    InvalidUrl,
    Connection,
    Other,
}

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{op}: duplicate key: {source}")]
    DuplicateKey {
        op: &'static str,
        source: sqlx::Error,
    },

    #[error("{op}: deadlock or busy database: {source}")]
    Deadlock {
        op: &'static str,
        source: sqlx::Error,
    },

    #[error(
        "mismatched input lengths: {chunk_ids} chunk ids but {chunk_indices} chunk indices"
    )]
    MismatchedInputLengths {
        chunk_ids: usize,
        chunk_indices: usize,
    },

    #[error("unsupported database driver: {0:?}")]
    UnsupportedDriver(String),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        source: sqlx::Error,
    },

    #[error("{op}: database error: {source}")]
    Database {
        op: &'static str,
        source: sqlx::Error,
    },

    #[error("a transaction is already in progress on this handle")]
    NestedTransaction,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Wrap a driver error raised by `op`, classifying it on the way.
    pub fn from_sqlx(op: &'static str, source: sqlx::Error) -> Self {
        match classify_sqlx_error(&source) {
            Some(ErrorKind::DuplicateKey) => MetadataError::DuplicateKey { op, source },
            Some(ErrorKind::Deadlock) => MetadataError::Deadlock { op, source },
            _ => MetadataError::Database { op, source },
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        MetadataError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// The portable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetadataError::NotFound { .. } => ErrorKind::NotFound,
            MetadataError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            MetadataError::Deadlock { .. } => ErrorKind::Deadlock,
            MetadataError::MismatchedInputLengths { .. } => ErrorKind::MismatchedInputLengths,
            MetadataError::UnsupportedDriver(_) => ErrorKind::UnsupportedDriver,
            MetadataError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            MetadataError::Connection { .. } => ErrorKind::Connection,
            MetadataError::Database { source, .. } => {
                classify_sqlx_error(source).unwrap_or(ErrorKind::Other)
            }
            MetadataError::NestedTransaction
            | MetadataError::Config(_)
            | MetadataError::Io(_)
            | MetadataError::Internal(_) => ErrorKind::Other,
        }
    }
}

impl From<sqlx::Error> for MetadataError {
    fn from(err: sqlx::Error) -> Self {
        MetadataError::from_sqlx("query", err)
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Whether `err` is a unique-constraint violation.
pub fn is_duplicate_key_error(err: &MetadataError) -> bool {
    err.kind() == ErrorKind::DuplicateKey
}

/// Whether `err` reports a lookup that matched no row.
pub fn is_not_found_error(err: &MetadataError) -> bool {
    err.kind() == ErrorKind::NotFound
}

/// Whether `err` is transient lock contention the caller may retry.
pub fn is_deadlock_error(err: &MetadataError) -> bool {
    err.kind() == ErrorKind::Deadlock
}

// =============================================================================
// Driver error classification
// =============================================================================

const SQLITE_CONSTRAINT_PRIMARYKEY: i64 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i64 = 2067;
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_PROTOCOL: i64 = 15;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_SERIALIZATION_FAILURE: &str = "40001";
const PG_DEADLOCK_DETECTED: &str = "40P01";

const MYSQL_DUP_ENTRY: u16 = 1062;
const MYSQL_LOCK_WAIT_TIMEOUT: u16 = 1205;
const MYSQL_LOCK_DEADLOCK: u16 = 1213;

/// Classify a raw driver error.
///
/// Useful for callers that went around the store through the raw pool handle.
/// Returns `None` for errors outside the portable taxonomy.
pub fn classify_sqlx_error(err: &sqlx::Error) -> Option<ErrorKind> {
    match err {
        sqlx::Error::RowNotFound => Some(ErrorKind::NotFound),
        sqlx::Error::Database(db) => classify_database_error(db.as_ref())
            .or_else(|| classify_message(db.message())),
        other => classify_message(&other.to_string()),
    }
}

fn classify_database_error(db: &(dyn DatabaseError + 'static)) -> Option<ErrorKind> {
    Sqlite::classify(db)
        .or_else(|| Postgres::classify(db))
        .or_else(|| MySql::classify(db))
}

/// SQLite reports extended result codes; the primary code sits in the low byte.
pub(crate) fn classify_sqlite(err: &SqliteError) -> Option<ErrorKind> {
    let code = err.code()?.parse::<i64>().ok()?;
    classify_sqlite_code(code)
}

pub(crate) fn classify_sqlite_code(code: i64) -> Option<ErrorKind> {
    match code {
        SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => Some(ErrorKind::DuplicateKey),
        c if matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED | SQLITE_PROTOCOL) => {
            Some(ErrorKind::Deadlock)
        }
        _ => None,
    }
}

pub(crate) fn classify_postgres_code(sqlstate: &str) -> Option<ErrorKind> {
    match sqlstate {
        PG_UNIQUE_VIOLATION => Some(ErrorKind::DuplicateKey),
        PG_SERIALIZATION_FAILURE | PG_DEADLOCK_DETECTED => Some(ErrorKind::Deadlock),
        _ => None,
    }
}

pub(crate) fn classify_mysql_number(number: u16) -> Option<ErrorKind> {
    match number {
        MYSQL_DUP_ENTRY => Some(ErrorKind::DuplicateKey),
        MYSQL_LOCK_DEADLOCK | MYSQL_LOCK_WAIT_TIMEOUT => Some(ErrorKind::Deadlock),
        _ => None,
    }
}

/// Last resort for wrapped errors that no longer downcast to a driver type.
pub(crate) fn classify_message(message: &str) -> Option<ErrorKind> {
    const DUPLICATE_MARKERS: [&str; 4] = [
        "Error 1062",
        "Duplicate entry",
        "UNIQUE constraint failed",
        "duplicate key value",
    ];
    const DEADLOCK_MARKERS: [&str; 3] = ["deadlock", "database is locked", "database is busy"];

    if DUPLICATE_MARKERS.iter().any(|m| message.contains(m)) {
        return Some(ErrorKind::DuplicateKey);
    }
    let lower = message.to_lowercase();
    if DEADLOCK_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(ErrorKind::Deadlock);
    }
    None
}
