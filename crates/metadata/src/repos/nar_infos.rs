//! NarInfo repository.

use crate::error::MetadataResult;
use crate::models::{NarInfo, NarInfoParams};
use async_trait::async_trait;

/// Repository for narinfo records and their references and signatures.
#[async_trait]
pub trait NarInfoRepo: Send + Sync {
    /// Get or create the narinfo for `params.hash`.
    ///
    /// An existing placeholder is filled in when `params.url` is set; any other
    /// existing row is returned unchanged. Concurrent callers for the same hash
    /// all receive the same row.
    async fn create_nar_info(&self, params: &NarInfoParams) -> MetadataResult<NarInfo>;

    async fn get_nar_info_by_hash(&self, hash: &str) -> MetadataResult<NarInfo>;

    async fn get_nar_info_by_id(&self, id: i64) -> MetadataResult<NarInfo>;

    /// Overwrite the metadata of an existing narinfo.
    ///
    /// Returns the updated row, or a not-found error if `params.hash` is unknown.
    async fn update_nar_info(&self, params: &NarInfoParams) -> MetadataResult<NarInfo>;

    /// Set the compressed file size. Returns rows affected.
    async fn update_nar_info_file_size(&self, hash: &str, file_size: u64) -> MetadataResult<u64>;

    /// Mark the narinfo as accessed now. Returns rows affected (0 if absent).
    async fn touch_nar_info(&self, hash: &str) -> MetadataResult<u64>;

    async fn delete_nar_info_by_hash(&self, hash: &str) -> MetadataResult<u64>;

    async fn delete_nar_info_by_id(&self, id: i64) -> MetadataResult<u64>;

    async fn get_nar_info_count(&self) -> MetadataResult<u64>;

    async fn get_all_nar_info_hashes(&self) -> MetadataResult<Vec<String>>;

    /// Hashes of every narinfo pointing at `url`.
    async fn get_nar_info_hashes_by_url(&self, url: &str) -> MetadataResult<Vec<String>>;

    /// Hashes of every narinfo linked to the NAR file `nar_file_id`.
    async fn get_nar_info_hashes_by_nar_file_id(
        &self,
        nar_file_id: i64,
    ) -> MetadataResult<Vec<String>>;

    /// Migrated narinfos that have no linked NAR file.
    async fn get_nar_infos_without_nar_files(&self) -> MetadataResult<Vec<NarInfo>>;

    /// Hashes of migrated narinfos whose NAR is missing or not yet chunked.
    async fn get_nar_info_hashes_to_chunk(&self) -> MetadataResult<Vec<String>>;

    /// Link a narinfo to the NAR file backing it. Linking twice is a no-op.
    async fn link_nar_info_to_nar_file(
        &self,
        nar_info_id: i64,
        nar_file_id: i64,
    ) -> MetadataResult<()>;

    /// Add a reference. Adding an existing reference is a no-op.
    async fn add_nar_info_reference(&self, nar_info_id: i64, reference: &str)
    -> MetadataResult<()>;

    /// Add several references at once, ignoring ones already present.
    async fn add_nar_info_references(
        &self,
        nar_info_id: i64,
        references: &[String],
    ) -> MetadataResult<()>;

    async fn get_nar_info_references(&self, nar_info_id: i64) -> MetadataResult<Vec<String>>;

    /// Add a signature. Adding an existing signature is a no-op.
    async fn add_nar_info_signature(&self, nar_info_id: i64, signature: &str)
    -> MetadataResult<()>;

    async fn add_nar_info_signatures(
        &self,
        nar_info_id: i64,
        signatures: &[String],
    ) -> MetadataResult<()>;

    async fn get_nar_info_signatures(&self, nar_info_id: i64) -> MetadataResult<Vec<String>>;
}
