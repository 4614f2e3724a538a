//! NAR file repository.

use crate::error::MetadataResult;
use crate::models::{CreateNarFileParams, NarFile, NarFileKey, Timestamp};
use async_trait::async_trait;

/// Repository for stored NAR file variants.
#[async_trait]
pub trait NarFileRepo: Send + Sync {
    /// Get or create the NAR file for `(hash, compression, query)`.
    ///
    /// Variants differing in compression or query are distinct rows.
    async fn create_nar_file(&self, params: &CreateNarFileParams) -> MetadataResult<NarFile>;

    async fn get_nar_file_by_key(&self, key: &NarFileKey) -> MetadataResult<NarFile>;

    /// First variant stored for `hash`, regardless of compression or query.
    async fn get_nar_file_by_hash(&self, hash: &str) -> MetadataResult<NarFile>;

    async fn get_nar_file_by_id(&self, id: i64) -> MetadataResult<NarFile>;

    /// NAR file linked to the narinfo `nar_info_id`.
    async fn get_nar_file_by_nar_info_id(&self, nar_info_id: i64) -> MetadataResult<NarFile>;

    /// Mark the variant as accessed now. Returns rows affected (0 if absent).
    async fn touch_nar_file(&self, key: &NarFileKey) -> MetadataResult<u64>;

    /// Delete one variant. Returns rows affected (0 if absent).
    async fn delete_nar_file_by_key(&self, key: &NarFileKey) -> MetadataResult<u64>;

    async fn delete_nar_file_by_id(&self, id: i64) -> MetadataResult<u64>;

    async fn get_nar_file_count(&self) -> MetadataResult<u64>;

    /// Sum of `file_size` over every stored NAR file.
    async fn get_nar_total_size(&self) -> MetadataResult<u64>;

    /// Record the chunk count once chunking completes. Returns rows affected.
    async fn update_nar_file_total_chunks(&self, id: i64, total_chunks: u64)
    -> MetadataResult<u64>;

    /// Stamp the start of a chunking pass. Returns rows affected.
    async fn set_nar_file_chunking_started(&self, id: i64) -> MetadataResult<u64>;

    /// Record when the stored file was last verified. Returns rows affected.
    async fn update_nar_file_verified_at(
        &self,
        id: i64,
        verified_at: Timestamp,
    ) -> MetadataResult<u64>;

    /// NAR files still waiting for a chunking pass, oldest first.
    async fn get_nar_files_to_chunk(&self, limit: u64) -> MetadataResult<Vec<NarFile>>;

    async fn get_nar_files_to_chunk_count(&self) -> MetadataResult<u64>;

    async fn has_any_chunked_nar_files(&self) -> MetadataResult<bool>;

    /// Compressed NAR files created before `created_before`, for re-compression sweeps.
    async fn get_old_compressed_nar_files(
        &self,
        created_before: Timestamp,
        limit: u64,
        offset: u64,
    ) -> MetadataResult<Vec<NarFile>>;
}
