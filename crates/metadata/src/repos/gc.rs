//! Eviction and orphan garbage collection.

use crate::error::MetadataResult;
use crate::models::{Chunk, NarFile, NarInfo};
use async_trait::async_trait;

/// Selection queries for LRU eviction and reclamation of unreferenced rows.
///
/// Least-used queries only select; deleting the returned rows is a separate,
/// explicit step for the caller.
#[async_trait]
pub trait GcRepo: Send + Sync {
    /// Least recently used NAR files whose cumulative `file_size` stays within `budget`.
    ///
    /// Rows come back oldest access first, up to and including the last row that
    /// keeps the running total at or below `budget`.
    async fn get_least_used_nar_files(&self, budget: u64) -> MetadataResult<Vec<NarFile>>;

    /// Least recently used narinfos whose cumulative size stays within `budget`.
    ///
    /// A narinfo's size is the total of its linked NAR files, or its own
    /// `file_size` when it has none.
    async fn get_least_used_nar_infos(&self, budget: u64) -> MetadataResult<Vec<NarInfo>>;

    /// NAR files no narinfo links to.
    async fn get_orphaned_nar_files(&self) -> MetadataResult<Vec<NarFile>>;

    /// Delete NAR files no narinfo links to. Returns rows affected.
    async fn delete_orphaned_nar_files(&self) -> MetadataResult<u64>;

    /// Narinfos not linked to any NAR file.
    async fn get_orphaned_nar_infos(&self) -> MetadataResult<Vec<NarInfo>>;

    /// Delete narinfos not linked to any NAR file. Returns rows affected.
    async fn delete_orphaned_nar_infos(&self) -> MetadataResult<u64>;

    /// Chunks no NAR file links to.
    async fn get_orphaned_chunks(&self) -> MetadataResult<Vec<Chunk>>;

    /// Delete chunks no NAR file links to. Returns rows affected.
    async fn delete_orphaned_chunks(&self) -> MetadataResult<u64>;
}
