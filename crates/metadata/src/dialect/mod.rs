//! SQL dialects.
//!
//! The store is a single engine parameterised over a [`Dialect`]. A dialect
//! only supplies what actually differs between backends: placeholder style,
//! identifier quoting, upsert syntax, native error classification, pool
//! defaults, per-connection setup and the schema.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use crate::error::ErrorKind;
use sqlx::error::DatabaseError;
use std::fmt;

/// Supported database backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
    MySql,
}

impl DatabaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Sqlite => "sqlite",
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default pool sizing for a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolDefaults {
    pub max_open: u32,
    pub max_idle: u32,
    /// Single-writer engines are pinned to `max_open` regardless of overrides.
    pub pinned: bool,
}

/// Backend-specific SQL fragments and behaviour.
pub trait Dialect: Send + Sync + 'static {
    const KIND: DatabaseKind;

    /// `INSERT ... ON CONFLICT ... RETURNING *` is available and is used for
    /// get-or-create. Without it creation falls back to insert, classify the
    /// failure, then fetch.
    const NATIVE_UPSERT: bool;

    /// Quote character for reserved identifiers such as `key` and `system`.
    const QUOTE: char;

    /// Schema DDL, one statement per `;`.
    const SCHEMA: &'static str;

    /// Bind parameter number `index` (1-based).
    fn placeholder(index: usize) -> String;

    /// Reference to the value proposed for `column` inside an upsert's update list.
    fn excluded(column: &str) -> String;

    /// Upsert tail: on conflict over `target`, apply `assignments`.
    fn on_conflict_update(target: &str, assignments: &str) -> String;

    /// Insert tail that turns a conflict over `target` into a no-op.
    /// `noop_column` is any column of the table, for engines that need an
    /// explicit self-assignment.
    fn on_conflict_ignore(target: &str, noop_column: &str) -> String;

    /// `SUM(expr)` typed as a 64-bit integer, zero over an empty set.
    fn sum_bigint(expr: &str) -> String;

    /// Classify a native driver error raised by this backend.
    fn classify(err: &(dyn DatabaseError + 'static)) -> Option<ErrorKind>;

    fn pool_defaults() -> PoolDefaults;

    /// Statements run on every new connection.
    fn session_setup() -> &'static [&'static str] {
        &[]
    }
}

/// Rewrite a query template for dialect `D`.
///
/// Templates use `?` for bind parameters and backticks around reserved
/// identifiers. Neither may appear inside string literals in a template.
pub(crate) fn render<D: Dialect>(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut index = 0;
    for c in template.chars() {
        match c {
            '?' => {
                index += 1;
                out.push_str(&D::placeholder(index));
            }
            '`' => out.push(D::QUOTE),
            c => out.push(c),
        }
    }
    out
}

/// Split a schema into executable statements, skipping comment-only chunks.
pub(crate) fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}
