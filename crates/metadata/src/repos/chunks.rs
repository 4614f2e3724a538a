//! Chunk repository.

use crate::error::MetadataResult;
use crate::models::{Chunk, CreateChunkParams};
use async_trait::async_trait;

/// Repository for content-addressed chunks and their order within NAR files.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Get or create the chunk for `params.hash`.
    async fn create_chunk(&self, params: &CreateChunkParams) -> MetadataResult<Chunk>;

    async fn get_chunk_by_hash(&self, hash: &str) -> MetadataResult<Chunk>;

    async fn get_chunk_by_id(&self, id: i64) -> MetadataResult<Chunk>;

    /// The chunk stored at `chunk_index` of a NAR file.
    async fn get_chunk_by_nar_file_id_and_index(
        &self,
        nar_file_id: i64,
        chunk_index: i64,
    ) -> MetadataResult<Chunk>;

    /// Chunks of a NAR file in ascending `chunk_index` order.
    ///
    /// Indices need not be contiguous; order is what matters for reassembly.
    async fn get_chunks_by_nar_file_id(&self, nar_file_id: i64) -> MetadataResult<Vec<Chunk>>;

    async fn get_total_chunk_size(&self) -> MetadataResult<u64>;

    async fn get_chunk_count(&self) -> MetadataResult<u64>;

    /// Delete a chunk and its links. Returns rows affected (0 if absent).
    async fn delete_chunk_by_id(&self, id: i64) -> MetadataResult<u64>;

    /// Place `chunk_id` at `chunk_index` of a NAR file.
    ///
    /// Re-linking an identical triple is a no-op.
    async fn link_nar_file_to_chunk(
        &self,
        nar_file_id: i64,
        chunk_id: i64,
        chunk_index: i64,
    ) -> MetadataResult<()>;

    /// Bulk form of [`ChunkRepo::link_nar_file_to_chunk`].
    ///
    /// `chunk_ids[i]` is placed at `chunk_indices[i]`. The two slices must have
    /// equal length; a mismatch is rejected before anything is written. All
    /// links are written atomically.
    async fn link_nar_file_to_chunks(
        &self,
        nar_file_id: i64,
        chunk_ids: &[i64],
        chunk_indices: &[i64],
    ) -> MetadataResult<()>;
}
