//! PostgreSQL dialect.

use super::{DatabaseKind, Dialect, PoolDefaults};
use crate::error::{ErrorKind, classify_postgres_code};
use narcache_core::{DEFAULT_MAX_IDLE_CONNS, DEFAULT_MAX_OPEN_CONNS};
use sqlx::error::DatabaseError;
use sqlx::postgres::PgDatabaseError;

/// PostgreSQL, with native `ON CONFLICT ... RETURNING`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    const KIND: DatabaseKind = DatabaseKind::Postgres;
    const NATIVE_UPSERT: bool = true;
    const QUOTE: char = '"';
    const SCHEMA: &'static str = include_str!("postgres_schema.sql");

    fn placeholder(index: usize) -> String {
        format!("${index}")
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
        format!("COALESCE(SUM({expr}), 0)::BIGINT")
    }

    fn classify(err: &(dyn DatabaseError + 'static)) -> Option<ErrorKind> {
        classify_postgres_code(err.try_downcast_ref::<PgDatabaseError>()?.code())
    }

    fn pool_defaults() -> PoolDefaults {
        PoolDefaults {
            max_open: DEFAULT_MAX_OPEN_CONNS,
            max_idle: DEFAULT_MAX_IDLE_CONNS,
            pinned: false,
        }
    }
}
