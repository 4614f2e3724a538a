//! Config repository.

use crate::error::MetadataResult;
use crate::models::Config;
use async_trait::async_trait;

/// Repository for persisted key/value settings.
#[async_trait]
pub trait ConfigRepo: Send + Sync {
    async fn get_config_by_key(&self, key: &str) -> MetadataResult<Config>;

    async fn get_config_by_id(&self, id: i64) -> MetadataResult<Config>;

    /// Insert or overwrite `key`.
    async fn set_config(&self, key: &str, value: &str) -> MetadataResult<()>;

    /// Insert `key`, failing with a duplicate-key error if it already exists.
    async fn create_config(&self, key: &str, value: &str) -> MetadataResult<Config>;
}
