use super::{SqlStore, clamp_i64};
use crate::dialect::Dialect;
use crate::error::MetadataResult;
use crate::models::NarInfo;
use crate::repos::MigrationRepo;
use async_trait::async_trait;
use narcache_core::compression::UNCOMPRESSED_VALUES;

#[async_trait]
impl<D: Dialect> MigrationRepo for SqlStore<D> {
    async fn get_unmigrated_nar_info_hashes(&self) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().unmigrated_nar_info_hashes)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn get_migrated_nar_info_hashes(&self) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().migrated_nar_info_hashes)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn get_migrated_nar_info_hashes_paginated(
        &self,
        limit: u64,
        offset: u64,
    ) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().migrated_nar_info_hashes_paginated)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn is_nar_info_migrated(&self, hash: &str) -> MetadataResult<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().is_nar_info_migrated)
            .bind(hash)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    async fn get_compressed_nar_infos(
        &self,
        limit: u64,
        offset: u64,
    ) -> MetadataResult<Vec<NarInfo>> {
        let [empty, none] = UNCOMPRESSED_VALUES;
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarInfo>(&self.queries().compressed_nar_infos)
            .bind(empty)
            .bind(none)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}
