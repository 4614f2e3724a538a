//! Metadata store test utilities.

use narcache_metadata::{MetadataError, MetadataResult, MetadataStore};
use std::future::Future;
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::postgres::Postgres;
use tracing_subscriber::EnvFilter;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
/// Tests use this marker to decide whether to skip due to unavailable Docker.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// Same as [`POSTGRES_CONTAINER_START_ERR_PREFIX`], for MySQL.
pub const MYSQL_CONTAINER_START_ERR_PREFIX: &str = "mysql-container-start:";

/// A SQLite metadata store in a temporary directory that is removed on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub url: String,
    _temp_dir: TempDir,
}

impl TestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
        let store = narcache_metadata::open(&url).await?;

        Ok(Self {
            store,
            url,
            _temp_dir: temp_dir,
        })
    }

    /// In-memory SQLite store (faster for tests).
    #[allow(dead_code)]
    pub async fn in_memory() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let url = "sqlite::memory:".to_string();
        let store = narcache_metadata::open(&url).await?;

        Ok(Self {
            store,
            url,
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// PostgreSQL test metadata store wrapper that manages a testcontainer.
#[allow(dead_code)]
pub struct PostgresTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!(
                    "{POSTGRES_CONTAINER_START_ERR_PREFIX} Failed to start PostgreSQL container: {e}"
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");
        let store = narcache_metadata::open(&url).await?;

        Ok(Self {
            store,
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// MySQL test metadata store wrapper that manages a testcontainer.
#[allow(dead_code)]
pub struct MySqlTestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Mysql>,
}

impl MySqlTestMetadata {
    pub async fn new() -> MetadataResult<Self> {
        let container = Mysql::default().start().await.map_err(|e| {
            MetadataError::Internal(format!(
                "{MYSQL_CONTAINER_START_ERR_PREFIX} Failed to start MySQL container: {e}"
            ))
        })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules mysql
        let url = format!("mysql://root@{host}:{port}/test");
        let store = narcache_metadata::open(&url).await?;

        Ok(Self {
            store,
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// Route store logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run a test against SQLite, and against PostgreSQL and MySQL when Docker is available.
#[allow(dead_code)]
pub async fn run_metadata_test_all<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();

    let sqlite = TestMetadata::new()
        .await
        .expect("Failed to create SQLite test metadata");
    test_fn(sqlite.store()).await;

    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestMetadata::new().await {
            Ok(postgres) => test_fn(postgres.store()).await,
            Err(err) => eprintln!("Skipping PostgreSQL metadata tests: {err}"),
        }
    }

    if std::env::var("SKIP_MYSQL_TESTS").is_err() {
        match MySqlTestMetadata::new().await {
            Ok(mysql) => test_fn(mysql.store()).await,
            Err(err) => eprintln!("Skipping MySQL metadata tests: {err}"),
        }
    }
}
