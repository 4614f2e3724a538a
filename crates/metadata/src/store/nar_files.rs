use super::{SqlStore, clamp_i64, db_err, to_i64, to_u64};
use crate::dialect::Dialect;
use crate::error::{MetadataError, MetadataResult, is_duplicate_key_error};
use crate::models::{CreateNarFileParams, NarFile, NarFileKey, Timestamp};
use crate::queries::Queries;
use crate::repos::NarFileRepo;
use async_trait::async_trait;
use narcache_core::compression::UNCOMPRESSED_VALUES;
use sqlx::{AnyConnection, FromRow};

async fn fetch_by_key(
    conn: &mut AnyConnection,
    queries: &Queries,
    key: &NarFileKey,
) -> MetadataResult<NarFile> {
    sqlx::query_as::<_, NarFile>(&queries.get_nar_file_by_key)
        .bind(key.hash.as_str())
        .bind(key.compression.as_str())
        .bind(key.query.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("nar file", key))
}

async fn fetch_by_id(
    conn: &mut AnyConnection,
    queries: &Queries,
    id: i64,
) -> MetadataResult<NarFile> {
    sqlx::query_as::<_, NarFile>(&queries.get_nar_file_by_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("nar file", id))
}

#[async_trait]
impl<D: Dialect> NarFileRepo for SqlStore<D> {
    async fn create_nar_file(&self, params: &CreateNarFileParams) -> MetadataResult<NarFile> {
        let q = self.queries();
        let file_size = to_i64(params.file_size, "file_size")?;
        let total_chunks = to_i64(params.total_chunks, "total_chunks")?;
        let now = Timestamp::now();
        let sql = if D::NATIVE_UPSERT {
            &q.upsert_nar_file
        } else {
            &q.insert_nar_file
        };
        let query = sqlx::query(sql)
            .bind(params.hash.as_str())
            .bind(params.compression.as_str())
            .bind(params.query.as_str())
            .bind(file_size)
            .bind(total_chunks)
            .bind(now)
            .bind(now);

        let mut conn = self.conn().await?;
        if D::NATIVE_UPSERT {
            let row = query
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err("create_nar_file"))?;
            return Ok(NarFile::from_row(&row)?);
        }

        match query.execute(&mut *conn).await {
            Ok(result) => match result.last_insert_id() {
                Some(id) => fetch_by_id(&mut conn, q, id).await,
                None => fetch_by_key(&mut conn, q, &params.key()).await,
            },
            Err(err) => {
                let err = MetadataError::from_sqlx("create_nar_file", err);
                if !is_duplicate_key_error(&err) {
                    return Err(err);
                }
                tracing::debug!(key = %params.key(), "Lost insert race; fetching existing row");
                fetch_by_key(&mut conn, q, &params.key()).await
            }
        }
    }

    async fn get_nar_file_by_key(&self, key: &NarFileKey) -> MetadataResult<NarFile> {
        let mut conn = self.conn().await?;
        fetch_by_key(&mut conn, self.queries(), key).await
    }

    async fn get_nar_file_by_hash(&self, hash: &str) -> MetadataResult<NarFile> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, NarFile>(&self.queries().get_nar_file_by_hash)
            .bind(hash)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::not_found("nar file", hash))
    }

    async fn get_nar_file_by_id(&self, id: i64) -> MetadataResult<NarFile> {
        let mut conn = self.conn().await?;
        fetch_by_id(&mut conn, self.queries(), id).await
    }

    async fn get_nar_file_by_nar_info_id(&self, nar_info_id: i64) -> MetadataResult<NarFile> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, NarFile>(&self.queries().get_nar_file_by_nar_info_id)
            .bind(nar_info_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                MetadataError::not_found("nar file", format!("for narinfo {nar_info_id}"))
            })
    }

    async fn touch_nar_file(&self, key: &NarFileKey) -> MetadataResult<u64> {
        let now = Timestamp::now();
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().touch_nar_file)
            .bind(now)
            .bind(now)
            .bind(key.hash.as_str())
            .bind(key.compression.as_str())
            .bind(key.query.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_nar_file_by_key(&self, key: &NarFileKey) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_nar_file_by_key)
            .bind(key.hash.as_str())
            .bind(key.compression.as_str())
            .bind(key.query.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_nar_file_by_id(&self, id: i64) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_nar_file_by_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_nar_file_count(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().count_nar_files)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(count, "nar file count")
    }

    async fn get_nar_total_size(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let total: i64 = sqlx::query_scalar(&self.queries().nar_total_size)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(total, "nar total size")
    }

    async fn update_nar_file_total_chunks(
        &self,
        id: i64,
        total_chunks: u64,
    ) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().update_nar_file_total_chunks)
            .bind(to_i64(total_chunks, "total_chunks")?)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_nar_file_chunking_started(&self, id: i64) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().set_nar_file_chunking_started)
            .bind(Timestamp::now())
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_nar_file_verified_at(
        &self,
        id: i64,
        verified_at: Timestamp,
    ) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().update_nar_file_verified_at)
            .bind(verified_at)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_nar_files_to_chunk(&self, limit: u64) -> MetadataResult<Vec<NarFile>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarFile>(&self.queries().nar_files_to_chunk)
            .bind(clamp_i64(limit))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn get_nar_files_to_chunk_count(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().nar_files_to_chunk_count)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(count, "nar files to chunk")
    }

    async fn has_any_chunked_nar_files(&self) -> MetadataResult<bool> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().has_any_chunked_nar_files)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    async fn get_old_compressed_nar_files(
        &self,
        created_before: Timestamp,
        limit: u64,
        offset: u64,
    ) -> MetadataResult<Vec<NarFile>> {
        let [empty, none] = UNCOMPRESSED_VALUES;
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarFile>(&self.queries().old_compressed_nar_files)
            .bind(empty)
            .bind(none)
            .bind(created_before)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }
}
