use super::{SqlStore, clamp_i64};
use crate::dialect::Dialect;
use crate::error::MetadataResult;
use crate::models::{Chunk, NarFile, NarInfo};
use crate::repos::GcRepo;
use async_trait::async_trait;

#[async_trait]
impl<D: Dialect> GcRepo for SqlStore<D> {
    async fn get_least_used_nar_files(&self, budget: u64) -> MetadataResult<Vec<NarFile>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarFile>(&self.queries().least_used_nar_files)
            .bind(clamp_i64(budget))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn get_least_used_nar_infos(&self, budget: u64) -> MetadataResult<Vec<NarInfo>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarInfo>(&self.queries().least_used_nar_infos)
            .bind(clamp_i64(budget))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn get_orphaned_nar_files(&self) -> MetadataResult<Vec<NarFile>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarFile>(&self.queries().orphaned_nar_files)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn delete_orphaned_nar_files(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_orphaned_nar_files)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(deleted = result.rows_affected(), "Deleted orphaned nar files");
        }
        Ok(result.rows_affected())
    }

    async fn get_orphaned_nar_infos(&self) -> MetadataResult<Vec<NarInfo>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarInfo>(&self.queries().orphaned_nar_infos)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn delete_orphaned_nar_infos(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_orphaned_nar_infos)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(deleted = result.rows_affected(), "Deleted orphaned narinfos");
        }
        Ok(result.rows_affected())
    }

    async fn get_orphaned_chunks(&self) -> MetadataResult<Vec<Chunk>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, Chunk>(&self.queries().orphaned_chunks)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn delete_orphaned_chunks(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_orphaned_chunks)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(deleted = result.rows_affected(), "Deleted orphaned chunks");
        }
        Ok(result.rows_affected())
    }
}
