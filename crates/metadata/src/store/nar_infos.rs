use super::{BATCH_ROWS, SqlStore, db_err, to_i64, to_u64};
use crate::dialect::Dialect;
use crate::error::{MetadataError, MetadataResult, is_duplicate_key_error};
use crate::models::{NarInfo, NarInfoParams, Timestamp};
use crate::queries::{BULK_REFERENCES, BULK_SIGNATURES, BulkInsert, Queries};
use crate::repos::NarInfoRepo;
use async_trait::async_trait;
use sqlx::{AnyConnection, FromRow};
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind the ten metadata columns in table order.
fn bind_metadata<'q>(
    query: AnyQuery<'q>,
    params: &'q NarInfoParams,
    file_size: Option<i64>,
    nar_size: Option<i64>,
) -> AnyQuery<'q> {
    query
        .bind(params.store_path.as_deref())
        .bind(params.url.as_deref())
        .bind(params.compression.as_deref())
        .bind(params.file_hash.as_deref())
        .bind(file_size)
        .bind(params.nar_hash.as_deref())
        .bind(nar_size)
        .bind(params.deriver.as_deref())
        .bind(params.system.as_deref())
        .bind(params.ca.as_deref())
}

fn sizes(params: &NarInfoParams) -> MetadataResult<(Option<i64>, Option<i64>)> {
    let file_size = params
        .file_size
        .map(|v| to_i64(v, "file_size"))
        .transpose()?;
    let nar_size = params
        .nar_size
        .map(|v| to_i64(v, "nar_size"))
        .transpose()?;
    Ok((file_size, nar_size))
}

async fn fetch_by_hash(
    conn: &mut AnyConnection,
    queries: &Queries,
    hash: &str,
) -> MetadataResult<NarInfo> {
    sqlx::query_as::<_, NarInfo>(&queries.get_nar_info_by_hash)
        .bind(hash)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("narinfo", hash))
}

async fn fetch_by_id(
    conn: &mut AnyConnection,
    queries: &Queries,
    id: i64,
) -> MetadataResult<NarInfo> {
    sqlx::query_as::<_, NarInfo>(&queries.get_nar_info_by_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("narinfo", id))
}

impl<D: Dialect> SqlStore<D> {
    /// Insert `(nar_info_id, value)` rows in batches, skipping existing pairs.
    async fn add_nar_info_values(
        &self,
        bulk: &BulkInsert,
        nar_info_id: i64,
        values: &[String],
    ) -> MetadataResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let mut tx = self.atomic().await?;
        for batch in values.chunks(BATCH_ROWS) {
            let sql = bulk.render::<D>(batch.len());
            let mut query = sqlx::query(&sql);
            for value in batch {
                query = query.bind(nar_info_id).bind(value.as_str());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit("add_nar_info_values").await
    }
}

#[async_trait]
impl<D: Dialect> NarInfoRepo for SqlStore<D> {
    async fn create_nar_info(&self, params: &NarInfoParams) -> MetadataResult<NarInfo> {
        let q = self.queries();
        let (file_size, nar_size) = sizes(params)?;
        let now = Timestamp::now();
        let mut conn = self.conn().await?;

        if D::NATIVE_UPSERT {
            let row = bind_metadata(
                sqlx::query(&q.upsert_nar_info).bind(params.hash.as_str()),
                params,
                file_size,
                nar_size,
            )
            .bind(now)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("create_nar_info"))?;
            return Ok(NarInfo::from_row(&row)?);
        }

        let inserted = bind_metadata(
            sqlx::query(&q.insert_nar_info).bind(params.hash.as_str()),
            params,
            file_size,
            nar_size,
        )
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await;

        match inserted {
            Ok(result) => match result.last_insert_id() {
                Some(id) => fetch_by_id(&mut conn, q, id).await,
                None => fetch_by_hash(&mut conn, q, &params.hash).await,
            },
            Err(err) => {
                let err = MetadataError::from_sqlx("create_nar_info", err);
                if !is_duplicate_key_error(&err) {
                    return Err(err);
                }
                tracing::debug!(hash = %params.hash, "Lost insert race; fetching existing row");
                if params.url.is_some() {
                    let filled = bind_metadata(
                        sqlx::query(&q.fill_nar_info_placeholder),
                        params,
                        file_size,
                        nar_size,
                    )
                    .bind(now)
                    .bind(now)
                    .bind(params.hash.as_str())
                    .execute(&mut *conn)
                    .await?;
                    if filled.rows_affected() > 0 {
                        tracing::debug!(hash = %params.hash, "Filled narinfo placeholder");
                    }
                }
                fetch_by_hash(&mut conn, q, &params.hash).await
            }
        }
    }

    async fn get_nar_info_by_hash(&self, hash: &str) -> MetadataResult<NarInfo> {
        let mut conn = self.conn().await?;
        fetch_by_hash(&mut conn, self.queries(), hash).await
    }

    async fn get_nar_info_by_id(&self, id: i64) -> MetadataResult<NarInfo> {
        let mut conn = self.conn().await?;
        fetch_by_id(&mut conn, self.queries(), id).await
    }

    async fn update_nar_info(&self, params: &NarInfoParams) -> MetadataResult<NarInfo> {
        let q = self.queries();
        let (file_size, nar_size) = sizes(params)?;
        let now = Timestamp::now();
        let mut conn = self.conn().await?;

        if D::NATIVE_UPSERT {
            let row = bind_metadata(
                sqlx::query(&q.update_nar_info_returning),
                params,
                file_size,
                nar_size,
            )
            .bind(now)
            .bind(now)
            .bind(params.hash.as_str())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::not_found("narinfo", &params.hash))?;
            return Ok(NarInfo::from_row(&row)?);
        }

        bind_metadata(sqlx::query(&q.update_nar_info), params, file_size, nar_size)
            .bind(now)
            .bind(now)
            .bind(params.hash.as_str())
            .execute(&mut *conn)
            .await?;
        fetch_by_hash(&mut conn, q, &params.hash).await
    }

    async fn update_nar_info_file_size(&self, hash: &str, file_size: u64) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().update_nar_info_file_size)
            .bind(to_i64(file_size, "file_size")?)
            .bind(hash)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn touch_nar_info(&self, hash: &str) -> MetadataResult<u64> {
        let now = Timestamp::now();
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().touch_nar_info)
            .bind(now)
            .bind(now)
            .bind(hash)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_nar_info_by_hash(&self, hash: &str) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_nar_info_by_hash)
            .bind(hash)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_nar_info_by_id(&self, id: i64) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(&self.queries().delete_nar_info_by_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_nar_info_count(&self) -> MetadataResult<u64> {
        let mut conn = self.conn().await?;
        let count: i64 = sqlx::query_scalar(&self.queries().count_nar_infos)
            .fetch_one(&mut *conn)
            .await?;
        to_u64(count, "narinfo count")
    }

    async fn get_all_nar_info_hashes(&self) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().all_nar_info_hashes)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn get_nar_info_hashes_by_url(&self, url: &str) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().nar_info_hashes_by_url)
            .bind(url)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn get_nar_info_hashes_by_nar_file_id(
        &self,
        nar_file_id: i64,
    ) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().nar_info_hashes_by_nar_file_id)
            .bind(nar_file_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn get_nar_infos_without_nar_files(&self) -> MetadataResult<Vec<NarInfo>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, NarInfo>(&self.queries().nar_infos_without_nar_files)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    async fn get_nar_info_hashes_to_chunk(&self) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let hashes = sqlx::query_scalar(&self.queries().nar_info_hashes_to_chunk)
            .fetch_all(&mut *conn)
            .await?;
        Ok(hashes)
    }

    async fn link_nar_info_to_nar_file(
        &self,
        nar_info_id: i64,
        nar_file_id: i64,
    ) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().link_nar_info_to_nar_file)
            .bind(nar_info_id)
            .bind(nar_file_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("link_nar_info_to_nar_file"))?;
        Ok(())
    }

    async fn add_nar_info_reference(
        &self,
        nar_info_id: i64,
        reference: &str,
    ) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().add_nar_info_reference)
            .bind(nar_info_id)
            .bind(reference)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn add_nar_info_references(
        &self,
        nar_info_id: i64,
        references: &[String],
    ) -> MetadataResult<()> {
        self.add_nar_info_values(&BULK_REFERENCES, nar_info_id, references)
            .await
    }

    async fn get_nar_info_references(&self, nar_info_id: i64) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let references = sqlx::query_scalar(&self.queries().nar_info_references)
            .bind(nar_info_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(references)
    }

    async fn add_nar_info_signature(
        &self,
        nar_info_id: i64,
        signature: &str,
    ) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().add_nar_info_signature)
            .bind(nar_info_id)
            .bind(signature)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn add_nar_info_signatures(
        &self,
        nar_info_id: i64,
        signatures: &[String],
    ) -> MetadataResult<()> {
        self.add_nar_info_values(&BULK_SIGNATURES, nar_info_id, signatures)
            .await
    }

    async fn get_nar_info_signatures(&self, nar_info_id: i64) -> MetadataResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let signatures = sqlx::query_scalar(&self.queries().nar_info_signatures)
            .bind(nar_info_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(signatures)
    }
}
