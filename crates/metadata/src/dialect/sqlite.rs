//! SQLite dialect.

use super::{DatabaseKind, Dialect, PoolDefaults};
use crate::error::{ErrorKind, classify_sqlite};
use sqlx::error::DatabaseError;
use sqlx::sqlite::SqliteError;

/// Embedded single-writer engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    const KIND: DatabaseKind = DatabaseKind::Sqlite;
    const NATIVE_UPSERT: bool = false;
    const QUOTE: char = '"';
    const SCHEMA: &'static str = include_str!("sqlite_schema.sql");

    fn placeholder(_index: usize) -> String {
        "?".to_string()
    }

    fn excluded(column: &str) -> String {
        format!("excluded.{column}")
    }

    fn on_conflict_update(target: &str, assignments: &str) -> String {
        format!("ON CONFLICT ({target}) DO UPDATE SET {assignments}")
    }

    fn on_conflict_ignore(target: &str, _noop_column: &str) -> String {
        format!("ON CONFLICT ({target}) DO NOTHING")
    }

    fn sum_bigint(expr: &str) -> String {
        format!("COALESCE(SUM({expr}), 0)")
    }

    fn classify(err: &(dyn DatabaseError + 'static)) -> Option<ErrorKind> {
        classify_sqlite(err.try_downcast_ref::<SqliteError>()?)
    }

    fn pool_defaults() -> PoolDefaults {
        // Concurrent connections only add lock-wait errors on a single-writer engine.
        PoolDefaults {
            max_open: 1,
            max_idle: 1,
            pinned: true,
        }
    }

    fn session_setup() -> &'static [&'static str] {
        &[
            "PRAGMA foreign_keys = ON",
            "PRAGMA busy_timeout = 5000",
            "PRAGMA journal_mode = WAL",
            "PRAGMA synchronous = NORMAL",
        ]
    }
}
