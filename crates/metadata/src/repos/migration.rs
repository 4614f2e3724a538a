//! Background migration state.

use crate::error::MetadataResult;
use crate::models::NarInfo;
use async_trait::async_trait;

/// Queries used by the backfill and re-compression jobs.
///
/// A narinfo is migrated once its `url` is set.
#[async_trait]
pub trait MigrationRepo: Send + Sync {
    async fn get_unmigrated_nar_info_hashes(&self) -> MetadataResult<Vec<String>>;

    async fn get_migrated_nar_info_hashes(&self) -> MetadataResult<Vec<String>>;

    async fn get_migrated_nar_info_hashes_paginated(
        &self,
        limit: u64,
        offset: u64,
    ) -> MetadataResult<Vec<String>>;

    /// False for unknown hashes as well as placeholders.
    async fn is_nar_info_migrated(&self, hash: &str) -> MetadataResult<bool>;

    /// Narinfos with a real compression codec (not `""` or `"none"`).
    async fn get_compressed_nar_infos(&self, limit: u64, offset: u64)
    -> MetadataResult<Vec<NarInfo>>;
}
