use super::{SqlStore, db_err};
use crate::dialect::Dialect;
use crate::error::{MetadataError, MetadataResult};
use crate::models::{Config, Timestamp};
use crate::queries::Queries;
use crate::repos::ConfigRepo;
use async_trait::async_trait;
use sqlx::AnyConnection;

async fn fetch_by_key(
    conn: &mut AnyConnection,
    queries: &Queries,
    key: &str,
) -> MetadataResult<Config> {
    sqlx::query_as::<_, Config>(&queries.get_config_by_key)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| MetadataError::not_found("config", key))
}

#[async_trait]
impl<D: Dialect> ConfigRepo for SqlStore<D> {
    async fn get_config_by_key(&self, key: &str) -> MetadataResult<Config> {
        let mut conn = self.conn().await?;
        fetch_by_key(&mut conn, self.queries(), key).await
    }

    async fn get_config_by_id(&self, id: i64) -> MetadataResult<Config> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Config>(&self.queries().get_config_by_id)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| MetadataError::not_found("config", id))
    }

    async fn set_config(&self, key: &str, value: &str) -> MetadataResult<()> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().set_config)
            .bind(key)
            .bind(value)
            .bind(Timestamp::now())
            .execute(&mut *conn)
            .await
            .map_err(db_err("set_config"))?;
        Ok(())
    }

    async fn create_config(&self, key: &str, value: &str) -> MetadataResult<Config> {
        let mut conn = self.conn().await?;
        sqlx::query(&self.queries().insert_config)
            .bind(key)
            .bind(value)
            .bind(Timestamp::now())
            .execute(&mut *conn)
            .await
            .map_err(db_err("create_config"))?;
        fetch_by_key(&mut conn, self.queries(), key).await
    }
}
