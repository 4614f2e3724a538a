//! SQL metadata store, generic over the backend dialect.

mod chunks;
mod config;
mod gc;
mod migration;
mod nar_files;
mod nar_infos;

use crate::dialect::{DatabaseKind, Dialect, MySql, Postgres, Sqlite, schema_statements};
use crate::error::{MetadataError, MetadataResult};
use crate::queries::Queries;
use crate::repos::{ChunkRepo, ConfigRepo, GcRepo, MigrationRepo, NarFileRepo, NarInfoRepo};
use crate::url::ConnectTarget;
use async_trait::async_trait;
use futures::future::BoxFuture;
use narcache_core::PoolConfig;
use sqlx::any::{Any, AnyPoolOptions};
use sqlx::{AnyConnection, AnyPool, Transaction};
use sqlx::pool::PoolConnection;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Combined metadata store trait.
///
/// This is the querier contract the rest of the system depends on; callers
/// never branch on which backend sits behind it.
#[async_trait]
pub trait MetadataStore:
    NarInfoRepo + NarFileRepo + ChunkRepo + GcRepo + MigrationRepo + ConfigRepo + Send + Sync
{
    /// Backend behind this store.
    fn kind(&self) -> DatabaseKind;

    /// Underlying connection pool, for migration tooling.
    fn pool(&self) -> &AnyPool;

    /// Create any missing tables and indexes.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Start a transaction. Every call on the returned handle runs inside it.
    ///
    /// Transactions do not nest: calling `begin` on a transaction handle fails.
    /// On SQLite the transaction holds the only connection, so the outer store
    /// must not be used until it is committed or rolled back.
    async fn begin(&self) -> MetadataResult<Box<dyn MetadataTx>>;
}

/// A transaction-scoped store.
///
/// Dropping the handle without committing rolls the transaction back.
#[async_trait]
pub trait MetadataTx: MetadataStore {
    fn as_store(&self) -> &dyn MetadataStore;

    async fn commit(self: Box<Self>) -> MetadataResult<()>;

    async fn rollback(self: Box<Self>) -> MetadataResult<()>;
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
///
/// ```ignore
/// let nar_info = with_tx(store.as_ref(), |tx| {
///     Box::pin(async move {
///         let nar_info = tx.create_nar_info(&params).await?;
///         tx.add_nar_info_references(nar_info.id, &references).await?;
///         Ok(nar_info)
///     })
/// })
/// .await?;
/// ```
pub async fn with_tx<T, F>(store: &dyn MetadataStore, f: F) -> MetadataResult<T>
where
    T: Send,
    F: for<'t> FnOnce(&'t dyn MetadataStore) -> BoxFuture<'t, MetadataResult<T>> + Send,
{
    let tx = store.begin().await?;
    let result = f(tx.as_store()).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back metadata transaction");
            }
            Err(err)
        }
    }
}

/// SQLite-backed store.
pub type SqliteStore = SqlStore<Sqlite>;
/// PostgreSQL-backed store.
pub type PostgresStore = SqlStore<Postgres>;
/// MySQL-backed store.
pub type MySqlStore = SqlStore<MySql>;

/// Metadata store over one SQL backend.
pub struct SqlStore<D: Dialect> {
    pool: AnyPool,
    queries: Arc<Queries>,
    tx: Option<Arc<Mutex<Transaction<'static, Any>>>>,
    _dialect: PhantomData<fn() -> D>,
}

impl<D: Dialect> Clone for SqlStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            queries: Arc::clone(&self.queries),
            tx: self.tx.clone(),
            _dialect: PhantomData,
        }
    }
}

impl<D: Dialect> SqlStore<D> {
    /// Open a pool for `target` and bring the schema up to date.
    pub async fn open(target: &ConnectTarget, config: &PoolConfig) -> MetadataResult<Self> {
        if target.kind != D::KIND {
            return Err(MetadataError::Config(format!(
                "{} url cannot open a {} store",
                target.kind,
                D::KIND
            )));
        }

        sqlx::any::install_default_drivers();

        // Ensure parent directory exists
        if let Some(parent) = target.sqlite_path.as_deref().and_then(|p| p.parent())
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let (max_open, max_idle) = pool_size::<D>(config);
        let mut options = AnyPoolOptions::new()
            .max_connections(max_open)
            .min_connections(max_idle)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));
        if D::pool_defaults().pinned {
            // An in-memory database lives exactly as long as its connection.
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let setup = D::session_setup();
        if !setup.is_empty() {
            options = options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    for statement in setup {
                        sqlx::query(statement).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            });
        }

        let pool = options
            .connect(&target.dsn)
            .await
            .map_err(|source| MetadataError::Connection {
                target: target.redacted(),
                source,
            })?;

        tracing::info!(
            dialect = %D::KIND,
            max_connections = max_open,
            min_connections = max_idle,
            "Opened metadata database pool"
        );

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and bring the schema up to date.
    pub async fn from_pool(pool: AnyPool) -> MetadataResult<Self> {
        let store = Self {
            pool,
            queries: Arc::new(Queries::new::<D>()),
            tx: None,
            _dialect: PhantomData,
        };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> MetadataResult<()> {
        for statement in schema_statements(D::SCHEMA) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_sqlx("migrate", e))?;
        }
        Ok(())
    }

    /// Start a transaction on a new handle sharing this store's pool.
    pub async fn begin_tx(&self) -> MetadataResult<Self> {
        if self.tx.is_some() {
            return Err(MetadataError::NestedTransaction);
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MetadataError::from_sqlx("begin", e))?;
        Ok(Self {
            pool: self.pool.clone(),
            queries: Arc::clone(&self.queries),
            tx: Some(Arc::new(Mutex::new(tx))),
            _dialect: PhantomData,
        })
    }

    pub async fn commit_tx(self) -> MetadataResult<()> {
        self.take_tx()?
            .commit()
            .await
            .map_err(|e| MetadataError::from_sqlx("commit", e))
    }

    pub async fn rollback_tx(self) -> MetadataResult<()> {
        self.take_tx()?
            .rollback()
            .await
            .map_err(|e| MetadataError::from_sqlx("rollback", e))
    }

    fn take_tx(self) -> MetadataResult<Transaction<'static, Any>> {
        let shared = self
            .tx
            .ok_or_else(|| MetadataError::Internal("handle is not a transaction".to_string()))?;
        Arc::try_unwrap(shared)
            .map(Mutex::into_inner)
            .map_err(|_| MetadataError::Internal("transaction handle is still shared".to_string()))
    }

    pub(crate) fn queries(&self) -> &Queries {
        &self.queries
    }

    /// Connection for a single statement: the open transaction, or one from the pool.
    pub(crate) async fn conn(&self) -> MetadataResult<Conn<'_>> {
        match &self.tx {
            Some(tx) => Ok(Conn::Tx(tx.lock().await)),
            None => self
                .pool
                .acquire()
                .await
                .map(Conn::Pooled)
                .map_err(|e| MetadataError::from_sqlx("acquire", e)),
        }
    }

    /// Connection for a multi-statement operation that must apply atomically.
    ///
    /// Joins the open transaction if there is one, otherwise starts a new one
    /// that is committed by [`Atomic::commit`] and rolled back on drop.
    pub(crate) async fn atomic(&self) -> MetadataResult<Atomic<'_>> {
        match &self.tx {
            Some(tx) => Ok(Atomic::Joined(tx.lock().await)),
            None => self
                .pool
                .begin()
                .await
                .map(Atomic::Owned)
                .map_err(|e| MetadataError::from_sqlx("begin", e)),
        }
    }
}

fn pool_size<D: Dialect>(config: &PoolConfig) -> (u32, u32) {
    let defaults = D::pool_defaults();
    if defaults.pinned {
        if let Some(requested) = config.max_open()
            && requested != defaults.max_open
        {
            tracing::warn!(
                requested,
                pinned = defaults.max_open,
                dialect = %D::KIND,
                "Ignoring pool.max_open_conns: this backend allows a single writer connection"
            );
        }
        let idle = config
            .max_idle()
            .unwrap_or(defaults.max_idle)
            .min(defaults.max_open);
        return (defaults.max_open, idle);
    }

    let open = config.max_open().unwrap_or(defaults.max_open);
    let idle = config.max_idle().unwrap_or(defaults.max_idle).min(open);
    (open, idle)
}

pub(crate) enum Conn<'a> {
    Pooled(PoolConnection<Any>),
    Tx(MutexGuard<'a, Transaction<'static, Any>>),
}

impl Deref for Conn<'_> {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self {
            Conn::Pooled(conn) => &**conn,
            Conn::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Tx(tx) => &mut ***tx,
        }
    }
}

pub(crate) enum Atomic<'a> {
    Owned(Transaction<'static, Any>),
    Joined(MutexGuard<'a, Transaction<'static, Any>>),
}

impl Atomic<'_> {
    /// Commit if this operation owns its transaction; a joined one is left to its owner.
    pub(crate) async fn commit(self, op: &'static str) -> MetadataResult<()> {
        match self {
            Atomic::Owned(tx) => tx
                .commit()
                .await
                .map_err(|e| MetadataError::from_sqlx(op, e)),
            Atomic::Joined(_) => Ok(()),
        }
    }
}

impl Deref for Atomic<'_> {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self {
            Atomic::Owned(tx) => &**tx,
            Atomic::Joined(tx) => &***tx,
        }
    }
}

impl DerefMut for Atomic<'_> {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self {
            Atomic::Owned(tx) => &mut **tx,
            Atomic::Joined(tx) => &mut ***tx,
        }
    }
}

/// Rows per multi-row insert. Keeps three-column batches under SQLite's
/// 999 bind parameter limit.
pub(crate) const BATCH_ROWS: usize = 300;

/// Map a driver error raised by `op` into the store's taxonomy.
pub(crate) fn db_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> MetadataError {
    move |e| MetadataError::from_sqlx(op, e)
}

pub(crate) fn to_i64(value: u64, what: &'static str) -> MetadataResult<i64> {
    i64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("{what} {value} exceeds the storable range")))
}

/// Clamp a budget, limit or offset into the range SQL can bind.
pub(crate) fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(value: i64, what: &'static str) -> MetadataResult<u64> {
    u64::try_from(value)
        .map_err(|_| MetadataError::Internal(format!("{what} returned negative value {value}")))
}

#[async_trait]
impl<D: Dialect> MetadataStore for SqlStore<D> {
    fn kind(&self) -> DatabaseKind {
        D::KIND
    }

    fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn migrate(&self) -> MetadataResult<()> {
        self.apply_schema().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries.health_check)
            .execute(&mut *conn)
            .await
            .map_err(db_err("health_check"))?;
        Ok(())
    }

    async fn begin(&self) -> MetadataResult<Box<dyn MetadataTx>> {
        Ok(Box::new(self.begin_tx().await?))
    }
}

#[async_trait]
impl<D: Dialect> MetadataTx for SqlStore<D> {
    fn as_store(&self) -> &dyn MetadataStore {
        self
    }

    async fn commit(self: Box<Self>) -> MetadataResult<()> {
        (*self).commit_tx().await
    }

    async fn rollback(self: Box<Self>) -> MetadataResult<()> {
        (*self).rollback_tx().await
    }
}
