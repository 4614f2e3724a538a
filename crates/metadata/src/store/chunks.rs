use super::{BATCH_ROWS, SqlStore, db_err, to_u64};
use crate::dialect::Dialect;
use crate::error::{MetadataError, MetadataResult, is_duplicate_key_error};
use crate::models::{Chunk, CreateChunkParams, Timestamp};
use crate::queries::{BULK_LINK_CHUNKS, Queries};
use crate::repos::ChunkRepo;
use async_trait::async_trait;
use sqlx::{AnyConnection, FromRow};

async fn fetch_by_hash(
    conn: &mut AnyConnection,
    queries: &Queries,
    hash: &str,
) -> MetadataResult<Chunk> {
    sqlx::query_as::<_, Chunk>(&queries.get_chunk_by_hash)
        .bind(hash)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("chunk", hash))
}

async fn fetch_by_id(conn: &mut AnyConnection, queries: &Queries, id: i64) -> MetadataResult<Chunk> {
    sqlx::query_as::<_, Chunk>(&queries.get_chunk_by_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("chunk", id))
}

#[async_trait]
impl<D: Dialect> ChunkRepo for SqlStore<D> {
    async fn create_chunk(&self, params: &CreateChunkParams) -> MetadataResult<Chunk> {
        let q = self.queries();
        let sql = if D::NATIVE_UPSERT {
            &q.upsert_chunk
        } else {
            &q.insert_chunk
        };
        let query = sqlx::query(sql)
            .bind(params.hash.as_str())
            .bind(i64::from(params.size))
            .bind(Timestamp::now());

        let mut conn = self.conn().await?;
        if D::NATIVE_UPSERT {
            let row = query
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err("create_chunk"))?;
            return Ok(Chunk::from_row(&row)?);
        }

        match query.execute(&mut *conn).await {
            Ok(result) => match result.last_insert_id() {
                Some(id) => fetch_by_id(&mut conn, q, id).await,
                None => fetch_by_hash(&mut conn, q, &params.hash).await,
            },
            Err(err) => {
                let err = MetadataError::from_sqlx("create_chunk", err);
                if !is_duplicate_key_error(&err) {
                    return Err(err);
                }
                tracing::debug!(hash = %params.hash, "Lost insert race; fetching existing row");
                fetch_by_hash(&mut conn, q, &params.hash).await
            }
        }
    }

    async fn get_chunk_by_hash(&self, hash: &str) -> MetadataResult<Chunk> {
        let mut conn = self.conn().await?;
        fetch_by_hash(&mut conn, self.queries(), hash).await
    }

    async fn get_chunk_by_id(&self, id: i64) -> MetadataResult<Chunk> {
        let mut conn = self.conn().await?;
        fetch_by_id(&mut conn, self.queries(), id).await
    }

    async fn get_chunk_by_nar_file_id_and_index(
        &self,
        nar_file_id: i64,
        chunk_index: i64,
    ) -> MetadataResult<Chunk> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Chunk>(&self.queries().get_chunk_by_nar_file_id_and_index)
            .bind(nar_file_id)
            .bind(chunk_index)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                MetadataError::not_found(
                    "chunk",
                    format!("index {chunk_index} of nar file {nar_file_id}"),
                )
            })
    }

    async fn get_chunks_by_nar_file_id(&self, nar_file_id: i64) -> MetadataResult<Vec<Chunk>> {
        let mut conn = self.conn().await?;
        let chunks = sqlx::query_as::<_, Chunk>(&self.queries().chunks_by_nar_file_id)
            .bind(nar_file_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(chunks)
    }

    async fn get_total_chunk_size(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let total: i64 = sqlx::query_scalar(&self.queries().total_chunk_size)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(total, "total chunk size")
    }

    async fn get_chunk_count(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().count_chunks)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(count, "chunk count")
    }

    async fn delete_chunk_by_id(&self, id: i64) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_chunk_by_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn link_nar_file_to_chunk(
        &self,
        nar_file_id: i64,
        chunk_id: i64,
        chunk_index: i64,
    ) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().link_nar_file_to_chunk)
            .bind(nar_file_id)
            .bind(chunk_id)
            .bind(chunk_index)
            .execute(&mut *conn)
            .await
            .map_err(db_err("link_nar_file_to_chunk"))?;
        Ok(())
    }

    async fn link_nar_file_to_chunks(
        &self,
        nar_file_id: i64,
        chunk_ids: &[i64],
        chunk_indices: &[i64],
    ) -> MetadataResult<()> {
        if chunk_ids.len() != chunk_indices.len() {
            return Err(MetadataError::MismatchedInputLengths {
                chunk_ids: chunk_ids.len(),
                chunk_indices: chunk_indices.len(),
            });
        }
        if chunk_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.atomic().await?;
        for (ids, indices) in chunk_ids
            .chunks(BATCH_ROWS)
            .zip(chunk_indices.chunks(BATCH_ROWS))
        {
            let sql = BULK_LINK_CHUNKS.render::<D>(ids.len());
            let mut query = sqlx::query(&sql);
            for (chunk_id, chunk_index) in ids.iter().zip(indices) {
                query = query.bind(nar_file_id).bind(*chunk_id).bind(*chunk_index);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(db_err("link_nar_file_to_chunks"))?;
        }
        tx.commit("link_nar_file_to_chunks").await?;

        tracing::debug!(nar_file_id, links = chunk_ids.len(), "Linked chunks to nar file");
        Ok(())
    }
}
