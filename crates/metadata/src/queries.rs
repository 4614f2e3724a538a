//! SQL for every store operation, rendered once per dialect.

use crate::dialect::{Dialect, render};

pub(crate) const NARINFO_COLUMNS: &str = "id, hash, store_path, url, compression, file_hash, \
     file_size, nar_hash, nar_size, deriver, `system`, ca, created_at, updated_at, \
     last_accessed_at";

pub(crate) const NARFILE_COLUMNS: &str = "id, hash, compression, query, file_size, \
     total_chunks, chunking_started_at, verified_at, created_at, updated_at, last_accessed_at";

pub(crate) const CHUNK_COLUMNS: &str = "id, hash, size, created_at, updated_at";

pub(crate) const CONFIG_COLUMNS: &str = "id, `key`, value, created_at, updated_at";

/// NarInfo metadata columns in bind order.
const NARINFO_METADATA: [&str; 10] = [
    "store_path",
    "url",
    "compression",
    "file_hash",
    "file_size",
    "nar_hash",
    "nar_size",
    "deriver",
    "`system`",
    "ca",
];

/// Prefix each column of a column list with `alias.`.
fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rendered statements for one dialect.
#[derive(Debug, Clone)]
pub(crate) struct Queries {
    pub health_check: String,

    // narinfos
    pub insert_nar_info: String,
    pub upsert_nar_info: String,
    pub fill_nar_info_placeholder: String,
    pub get_nar_info_by_hash: String,
    pub get_nar_info_by_id: String,
    pub update_nar_info: String,
    pub update_nar_info_returning: String,
    pub update_nar_info_file_size: String,
    pub touch_nar_info: String,
    pub delete_nar_info_by_hash: String,
    pub delete_nar_info_by_id: String,
    pub count_nar_infos: String,
    pub all_nar_info_hashes: String,
    pub nar_info_hashes_by_url: String,
    pub nar_info_hashes_by_nar_file_id: String,
    pub nar_infos_without_nar_files: String,
    pub nar_info_hashes_to_chunk: String,
    pub link_nar_info_to_nar_file: String,
    pub add_nar_info_reference: String,
    pub nar_info_references: String,
    pub add_nar_info_signature: String,
    pub nar_info_signatures: String,

    // nar_files
    pub insert_nar_file: String,
    pub upsert_nar_file: String,
    pub get_nar_file_by_key: String,
    pub get_nar_file_by_hash: String,
    pub get_nar_file_by_id: String,
    pub get_nar_file_by_nar_info_id: String,
    pub touch_nar_file: String,
    pub delete_nar_file_by_key: String,
    pub delete_nar_file_by_id: String,
    pub count_nar_files: String,
    pub nar_total_size: String,
    pub update_nar_file_total_chunks: String,
    pub set_nar_file_chunking_started: String,
    pub update_nar_file_verified_at: String,
    pub nar_files_to_chunk: String,
    pub nar_files_to_chunk_count: String,
    pub has_any_chunked_nar_files: String,
    pub old_compressed_nar_files: String,

    // chunks
    pub insert_chunk: String,
    pub upsert_chunk: String,
    pub get_chunk_by_hash: String,
    pub get_chunk_by_id: String,
    pub get_chunk_by_nar_file_id_and_index: String,
    pub chunks_by_nar_file_id: String,
    pub total_chunk_size: String,
    pub count_chunks: String,
    pub delete_chunk_by_id: String,
    pub link_nar_file_to_chunk: String,

    // eviction and orphan gc
    pub least_used_nar_files: String,
    pub least_used_nar_infos: String,
    pub orphaned_nar_files: String,
    pub delete_orphaned_nar_files: String,
    pub orphaned_nar_infos: String,
    pub delete_orphaned_nar_infos: String,
    pub orphaned_chunks: String,
    pub delete_orphaned_chunks: String,

    // migration state
    pub unmigrated_nar_info_hashes: String,
    pub migrated_nar_info_hashes: String,
    pub migrated_nar_info_hashes_paginated: String,
    pub is_nar_info_migrated: String,
    pub compressed_nar_infos: String,

    // config
    pub get_config_by_key: String,
    pub get_config_by_id: String,
    pub insert_config: String,
    pub set_config: String,
}

/// Multi-row insert tails, rendered per call since the row count varies.
pub(crate) struct BulkInsert {
    pub prefix: &'static str,
    pub row: &'static str,
    pub conflict_target: &'static str,
    pub noop_column: &'static str,
}

pub(crate) const BULK_LINK_CHUNKS: BulkInsert = BulkInsert {
    prefix: "INSERT INTO narfile_chunk_links (narfile_id, chunk_id, chunk_index) VALUES ",
    row: "(?, ?, ?)",
    conflict_target: "narfile_id, chunk_index",
    noop_column: "chunk_id",
};

pub(crate) const BULK_REFERENCES: BulkInsert = BulkInsert {
    prefix: "INSERT INTO narinfo_references (narinfo_id, reference) VALUES ",
    row: "(?, ?)",
    conflict_target: "narinfo_id, reference",
    noop_column: "reference",
};

pub(crate) const BULK_SIGNATURES: BulkInsert = BulkInsert {
    prefix: "INSERT INTO narinfo_signatures (narinfo_id, signature) VALUES ",
    row: "(?, ?)",
    conflict_target: "narinfo_id, signature",
    noop_column: "signature",
};

impl BulkInsert {
    pub fn render<D: Dialect>(&self, rows: usize) -> String {
        let values = vec![self.row; rows].join(", ");
        render::<D>(&format!(
            "{}{values} {}",
            self.prefix,
            D::on_conflict_ignore(self.conflict_target, self.noop_column)
        ))
    }
}

impl Queries {
    pub fn new<D: Dialect>() -> Self {
        let ni = NARINFO_COLUMNS;
        let nf = NARFILE_COLUMNS;
        let ch = CHUNK_COLUMNS;
        let q = |sql: &str| render::<D>(sql);

        let insert_nar_info = format!(
            "INSERT INTO narinfos (hash, {}, created_at, last_accessed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            NARINFO_METADATA.join(", ")
        );

        // Filling a placeholder is the only way an existing row changes on create.
        let fills = format!("narinfos.url IS NULL AND {} IS NOT NULL", D::excluded("url"));
        let mut fill_assignments: Vec<String> = NARINFO_METADATA
            .iter()
            .map(|c| {
                format!(
                    "{c} = CASE WHEN {fills} THEN {} ELSE narinfos.{c} END",
                    D::excluded(c)
                )
            })
            .collect();
        fill_assignments.push(format!(
            "updated_at = CASE WHEN {fills} THEN {} ELSE narinfos.updated_at END",
            D::excluded("last_accessed_at")
        ));
        fill_assignments.push(format!(
            "last_accessed_at = CASE WHEN {fills} THEN {} ELSE narinfos.last_accessed_at END",
            D::excluded("last_accessed_at")
        ));
        let upsert_nar_info = format!(
            "{insert_nar_info} {} RETURNING {ni}",
            D::on_conflict_update("hash", &fill_assignments.join(", "))
        );

        let metadata_set = NARINFO_METADATA
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let update_nar_info = format!(
            "UPDATE narinfos SET {metadata_set}, updated_at = ?, last_accessed_at = ? \
             WHERE hash = ?"
        );

        let insert_nar_file = "INSERT INTO nar_files \
             (hash, compression, query, file_size, total_chunks, created_at, last_accessed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)"
            .to_string();
        let insert_chunk = "INSERT INTO chunks (hash, size, created_at) VALUES (?, ?, ?)";
        let insert_config = "INSERT INTO config (`key`, value, created_at) VALUES (?, ?, ?)";

        let not_uncompressed = "compression NOT IN (?, ?)";

        // Linked NAR files win; unlinked rows fall back to their own file_size.
        let narinfo_size = "COALESCE((SELECT SUM(f.file_size) FROM narinfo_narfile_links l \
             JOIN nar_files f ON f.id = l.narfile_id WHERE l.narinfo_id = ni.id), \
             ni.file_size, 0)";

        Self {
            health_check: "SELECT 1".to_string(),

            upsert_nar_info: q(&upsert_nar_info),
            insert_nar_info: q(&insert_nar_info),
            fill_nar_info_placeholder: q(&format!(
                "UPDATE narinfos SET {metadata_set}, updated_at = ?, last_accessed_at = ? \
                 WHERE hash = ? AND url IS NULL"
            )),
            get_nar_info_by_hash: q(&format!("SELECT {ni} FROM narinfos WHERE hash = ?")),
            get_nar_info_by_id: q(&format!("SELECT {ni} FROM narinfos WHERE id = ?")),
            update_nar_info_returning: q(&format!("{update_nar_info} RETURNING {ni}")),
            update_nar_info: q(&update_nar_info),
            update_nar_info_file_size: q("UPDATE narinfos SET file_size = ? WHERE hash = ?"),
            touch_nar_info: q(
                "UPDATE narinfos SET last_accessed_at = ?, updated_at = ? WHERE hash = ?",
            ),
            delete_nar_info_by_hash: q("DELETE FROM narinfos WHERE hash = ?"),
            delete_nar_info_by_id: q("DELETE FROM narinfos WHERE id = ?"),
            count_nar_infos: q("SELECT COUNT(*) FROM narinfos"),
            all_nar_info_hashes: q("SELECT hash FROM narinfos ORDER BY hash"),
            nar_info_hashes_by_url: q("SELECT hash FROM narinfos WHERE url = ? ORDER BY hash"),
            nar_info_hashes_by_nar_file_id: q(
                "SELECT ni.hash FROM narinfos ni \
                 JOIN narinfo_narfile_links l ON l.narinfo_id = ni.id \
                 WHERE l.narfile_id = ? ORDER BY ni.hash",
            ),
            nar_infos_without_nar_files: q(&format!(
                "SELECT {ni} FROM narinfos WHERE url IS NOT NULL AND NOT EXISTS \
                 (SELECT 1 FROM narinfo_narfile_links l WHERE l.narinfo_id = narinfos.id) \
                 ORDER BY id"
            )),
            nar_info_hashes_to_chunk: q(
                "SELECT DISTINCT ni.hash FROM narinfos ni \
                 LEFT JOIN narinfo_narfile_links l ON l.narinfo_id = ni.id \
                 LEFT JOIN nar_files f ON f.id = l.narfile_id \
                 WHERE ni.url IS NOT NULL AND (f.id IS NULL OR f.total_chunks = 0) \
                 ORDER BY ni.hash",
            ),
            link_nar_info_to_nar_file: q(&format!(
                "INSERT INTO narinfo_narfile_links (narinfo_id, narfile_id) VALUES (?, ?) {}",
                D::on_conflict_ignore("narinfo_id, narfile_id", "narfile_id")
            )),
            add_nar_info_reference: BULK_REFERENCES.render::<D>(1),
            nar_info_references: q(
                "SELECT reference FROM narinfo_references WHERE narinfo_id = ? \
                 ORDER BY reference",
            ),
            add_nar_info_signature: BULK_SIGNATURES.render::<D>(1),
            nar_info_signatures: q(
                "SELECT signature FROM narinfo_signatures WHERE narinfo_id = ? \
                 ORDER BY signature",
            ),

            upsert_nar_file: q(&format!(
                "{insert_nar_file} {} RETURNING {nf}",
                D::on_conflict_update("hash, compression, query", &format!(
                    "hash = {}",
                    D::excluded("hash")
                ))
            )),
            insert_nar_file: q(&insert_nar_file),
            get_nar_file_by_key: q(&format!(
                "SELECT {nf} FROM nar_files WHERE hash = ? AND compression = ? AND query = ?"
            )),
            get_nar_file_by_hash: q(&format!(
                "SELECT {nf} FROM nar_files WHERE hash = ? ORDER BY id LIMIT 1"
            )),
            get_nar_file_by_id: q(&format!("SELECT {nf} FROM nar_files WHERE id = ?")),
            get_nar_file_by_nar_info_id: q(&format!(
                "SELECT {} FROM nar_files f \
                 JOIN narinfo_narfile_links l ON l.narfile_id = f.id \
                 WHERE l.narinfo_id = ? ORDER BY f.id LIMIT 1",
                qualified(nf, "f")
            )),
            touch_nar_file: q(
                "UPDATE nar_files SET last_accessed_at = ?, updated_at = ? \
                 WHERE hash = ? AND compression = ? AND query = ?",
            ),
            delete_nar_file_by_key: q(
                "DELETE FROM nar_files WHERE hash = ? AND compression = ? AND query = ?",
            ),
            delete_nar_file_by_id: q("DELETE FROM nar_files WHERE id = ?"),
            count_nar_files: q("SELECT COUNT(*) FROM nar_files"),
            nar_total_size: q(&format!(
                "SELECT {} FROM nar_files",
                D::sum_bigint("file_size")
            )),
            update_nar_file_total_chunks: q("UPDATE nar_files SET total_chunks = ? WHERE id = ?"),
            set_nar_file_chunking_started: q(
                "UPDATE nar_files SET chunking_started_at = ? WHERE id = ?",
            ),
            update_nar_file_verified_at: q("UPDATE nar_files SET verified_at = ? WHERE id = ?"),
            nar_files_to_chunk: q(&format!(
                "SELECT {nf} FROM nar_files WHERE total_chunks = 0 ORDER BY id LIMIT ?"
            )),
            nar_files_to_chunk_count: q("SELECT COUNT(*) FROM nar_files WHERE total_chunks = 0"),
            has_any_chunked_nar_files: q(
                "SELECT COUNT(*) FROM (SELECT 1 AS one FROM nar_files \
                 WHERE total_chunks > 0 LIMIT 1) chunked",
            ),
            old_compressed_nar_files: q(&format!(
                "SELECT {nf} FROM nar_files WHERE {not_uncompressed} AND created_at < ? \
                 ORDER BY created_at, id LIMIT ? OFFSET ?"
            )),

            upsert_chunk: q(&format!(
                "{insert_chunk} {} RETURNING {ch}",
                D::on_conflict_update("hash", &format!("hash = {}", D::excluded("hash")))
            )),
            insert_chunk: q(insert_chunk),
            get_chunk_by_hash: q(&format!("SELECT {ch} FROM chunks WHERE hash = ?")),
            get_chunk_by_id: q(&format!("SELECT {ch} FROM chunks WHERE id = ?")),
            get_chunk_by_nar_file_id_and_index: q(&format!(
                "SELECT {} FROM chunks c JOIN narfile_chunk_links l ON l.chunk_id = c.id \
                 WHERE l.narfile_id = ? AND l.chunk_index = ?",
                qualified(ch, "c")
            )),
            chunks_by_nar_file_id: q(&format!(
                "SELECT {} FROM chunks c JOIN narfile_chunk_links l ON l.chunk_id = c.id \
                 WHERE l.narfile_id = ? ORDER BY l.chunk_index",
                qualified(ch, "c")
            )),
            total_chunk_size: q(&format!("SELECT {} FROM chunks", D::sum_bigint("size"))),
            count_chunks: q("SELECT COUNT(*) FROM chunks"),
            delete_chunk_by_id: q("DELETE FROM chunks WHERE id = ?"),
            link_nar_file_to_chunk: BULK_LINK_CHUNKS.render::<D>(1),

            least_used_nar_files: q(&format!(
                "SELECT {nf} FROM (\
                 SELECT nar_files.*, SUM(file_size) OVER \
                 (ORDER BY last_accessed_at, id ROWS UNBOUNDED PRECEDING) AS running_total \
                 FROM nar_files) ranked \
                 WHERE running_total <= ? ORDER BY last_accessed_at, id"
            )),
            least_used_nar_infos: q(&format!(
                "SELECT {ni} FROM (\
                 SELECT sized.*, SUM(eviction_size) OVER \
                 (ORDER BY last_accessed_at, id ROWS UNBOUNDED PRECEDING) AS running_total \
                 FROM (SELECT ni.*, {narinfo_size} AS eviction_size FROM narinfos ni) sized\
                 ) ranked \
                 WHERE running_total <= ? ORDER BY last_accessed_at, id"
            )),
            orphaned_nar_files: q(&format!(
                "SELECT {nf} FROM nar_files WHERE NOT EXISTS \
                 (SELECT 1 FROM narinfo_narfile_links l WHERE l.narfile_id = nar_files.id) \
                 ORDER BY id"
            )),
            delete_orphaned_nar_files: q(
                "DELETE FROM nar_files WHERE NOT EXISTS \
                 (SELECT 1 FROM narinfo_narfile_links l WHERE l.narfile_id = nar_files.id)",
            ),
            orphaned_nar_infos: q(&format!(
                "SELECT {ni} FROM narinfos WHERE NOT EXISTS \
                 (SELECT 1 FROM narinfo_narfile_links l WHERE l.narinfo_id = narinfos.id) \
                 ORDER BY id"
            )),
            delete_orphaned_nar_infos: q(
                "DELETE FROM narinfos WHERE NOT EXISTS \
                 (SELECT 1 FROM narinfo_narfile_links l WHERE l.narinfo_id = narinfos.id)",
            ),
            orphaned_chunks: q(&format!(
                "SELECT {ch} FROM chunks WHERE NOT EXISTS \
                 (SELECT 1 FROM narfile_chunk_links l WHERE l.chunk_id = chunks.id) \
                 ORDER BY id"
            )),
            delete_orphaned_chunks: q(
                "DELETE FROM chunks WHERE NOT EXISTS \
                 (SELECT 1 FROM narfile_chunk_links l WHERE l.chunk_id = chunks.id)",
            ),

            unmigrated_nar_info_hashes: q(
                "SELECT hash FROM narinfos WHERE url IS NULL ORDER BY hash",
            ),
            migrated_nar_info_hashes: q(
                "SELECT hash FROM narinfos WHERE url IS NOT NULL ORDER BY hash",
            ),
            migrated_nar_info_hashes_paginated: q(
                "SELECT hash FROM narinfos WHERE url IS NOT NULL ORDER BY hash LIMIT ? OFFSET ?",
            ),
            is_nar_info_migrated: q(
                "SELECT COUNT(*) FROM narinfos WHERE hash = ? AND url IS NOT NULL",
            ),
            compressed_nar_infos: q(&format!(
                "SELECT {ni} FROM narinfos WHERE compression IS NOT NULL AND {not_uncompressed} \
                 ORDER BY id LIMIT ? OFFSET ?"
            )),

            get_config_by_key: q(&format!(
                "SELECT {CONFIG_COLUMNS} FROM config WHERE `key` = ?"
            )),
            get_config_by_id: q(&format!("SELECT {CONFIG_COLUMNS} FROM config WHERE id = ?")),
            set_config: q(&format!(
                "{insert_config} {}",
                D::on_conflict_update(
                    "`key`",
                    &format!(
                        "value = {}, updated_at = {}",
                        D::excluded("value"),
                        D::excluded("created_at")
                    )
                )
            )),
            insert_config: q(insert_config),
        }
    }
}
