//! MySQL / MariaDB dialect.

use super::{DatabaseKind, Dialect, PoolDefaults};
use crate::error::{ErrorKind, classify_mysql_number};
use narcache_core::{DEFAULT_MAX_IDLE_CONNS, DEFAULT_MAX_OPEN_CONNS};
use sqlx::error::DatabaseError;
use sqlx::mysql::MySqlDatabaseError;

/// MySQL, which has no `RETURNING` on insert.
#[derive(Clone, Copy, Debug, Default)]
pub struct MySql;

impl Dialect for MySql {
    const KIND: DatabaseKind = DatabaseKind::MySql;
    const NATIVE_UPSERT: bool = false;
    const QUOTE: char = '`';
    const SCHEMA: &'static str = include_str!("mysql_schema.sql");

    fn placeholder(_index: usize) -> String {
        "?".to_string()
    }

    fn excluded(column: &str) -> String {
        format!("VALUES({column})")
    }

    fn on_conflict_update(_target: &str, assignments: &str) -> String {
        format!("ON DUPLICATE KEY UPDATE {assignments}")
    }

    fn on_conflict_ignore(_target: &str, noop_column: &str) -> String {
        // INSERT IGNORE would also swallow foreign key and truncation errors.
        format!("ON DUPLICATE KEY UPDATE {noop_column} = {noop_column}")
    }

    fn sum_bigint(expr: &str) -> String {
        format!("CAST(COALESCE(SUM({expr}), 0) AS SIGNED)")
    }

    fn classify(err: &(dyn DatabaseError + 'static)) -> Option<ErrorKind> {
        classify_mysql_number(err.try_downcast_ref::<MySqlDatabaseError>()?.number())
    }

    fn pool_defaults() -> PoolDefaults {
        PoolDefaults {
            max_open: DEFAULT_MAX_OPEN_CONNS,
            max_idle: DEFAULT_MAX_IDLE_CONNS,
            pinned: false,
        }
    }
}
