//! Metadata store for the narcache binary cache.
//!
//! This crate owns the relational data model behind the cache:
//! - NarInfo records, their references and signatures
//! - NAR file variants and the chunks they are split into
//! - Eviction and orphan garbage collection queries
//! - Background migration state and persisted settings
//!
//! One engine, [`SqlStore`], serves SQLite, PostgreSQL and MySQL. The backend
//! is picked from the database URL and callers only ever see
//! [`MetadataStore`].

pub mod dialect;
pub mod error;
pub mod models;
mod queries;
pub mod repos;
pub mod store;
pub mod url;

pub use dialect::DatabaseKind;
pub use error::{
    ErrorKind, MetadataError, MetadataResult, classify_sqlx_error, is_deadlock_error,
    is_duplicate_key_error, is_not_found_error,
};
pub use store::{
    MetadataStore, MetadataTx, MySqlStore, PostgresStore, SqlStore, SqliteStore, with_tx,
};

use dialect::{MySql, Postgres, Sqlite};
use narcache_core::{MetadataConfig, PoolConfig};
use std::sync::Arc;

/// Open the metadata store at `database_url` with default pool settings.
pub async fn open(database_url: &str) -> MetadataResult<Arc<dyn MetadataStore>> {
    open_with(database_url, &PoolConfig::default()).await
}

/// Open the metadata store at `database_url`.
///
/// The schema is created on first open.
pub async fn open_with(
    database_url: &str,
    pool: &PoolConfig,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    let target = url::parse_database_url(database_url)?;
    tracing::info!(dialect = %target.kind, url = %target.redacted(), "Connecting to metadata database");

    let store: Arc<dyn MetadataStore> = match target.kind {
        DatabaseKind::Sqlite => Arc::new(SqlStore::<Sqlite>::open(&target, pool).await?),
        DatabaseKind::Postgres => Arc::new(SqlStore::<Postgres>::open(&target, pool).await?),
        DatabaseKind::MySql => Arc::new(SqlStore::<MySql>::open(&target, pool).await?),
    };
    Ok(store)
}

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config
        .validate()
        .map_err(|e| MetadataError::Config(e.to_string()))?;
    open_with(&config.url, &config.pool).await
}
