//! Eviction selection and orphan GC tests, run against every available backend.

mod common;

use common::{chunk, migrated_nar_info, nar_file, run_metadata_test_all, test_hash, tick};
use narcache_metadata::models::{NarInfoParams, Timestamp};

#[tokio::test]
async fn test_least_used_nar_files_respects_budget() {
    run_metadata_test_all(|store| async move {
        let mut files = Vec::new();
        for (name, size) in [("lru-a", 100), ("lru-b", 200), ("lru-c", 300)] {
            files.push(
                store
                    .create_nar_file(&nar_file(&test_hash(name), "", size))
                    .await
                    .unwrap(),
            );
            tick().await;
        }

        // Leave the first file as the least recently used.
        for nf in &files[1..] {
            store.touch_nar_file(&nf.key()).await.unwrap();
            tick().await;
        }

        let evict = store.get_least_used_nar_files(100).await.unwrap();
        assert_eq!(evict.len(), 1);
        assert_eq!(evict[0].id, files[0].id);

        assert!(store.get_least_used_nar_files(99).await.unwrap().is_empty());

        let evict: Vec<i64> = store
            .get_least_used_nar_files(350)
            .await
            .unwrap()
            .iter()
            .map(|nf| nf.id)
            .collect();
        assert_eq!(evict, vec![files[0].id, files[1].id]);

        let evict = store.get_least_used_nar_files(1_000_000).await.unwrap();
        assert_eq!(evict.len(), 3);

        // Selection never deletes.
        assert_eq!(store.get_nar_file_count().await.unwrap(), 3);
    })
    .await;
}

#[tokio::test]
async fn test_least_used_nar_infos_sizes() {
    run_metadata_test_all(|store| async move {
        let linked_hash = test_hash("lru-linked");
        let linked = store
            .create_nar_info(&migrated_nar_info(&linked_hash))
            .await
            .unwrap();
        let nf = store
            .create_nar_file(&nar_file(&linked_hash, "xz", 500))
            .await
            .unwrap();
        store.link_nar_info_to_nar_file(linked.id, nf.id).await.unwrap();
        tick().await;

        // No NAR file yet: sized by its own file_size (4096).
        let unlinked = store
            .create_nar_info(&migrated_nar_info(&test_hash("lru-unlinked")))
            .await
            .unwrap();
        tick().await;

        // Placeholder with no size at all.
        let placeholder = store
            .create_nar_info(&NarInfoParams::placeholder(test_hash("lru-placeholder")))
            .await
            .unwrap();

        let ids = |rows: Vec<narcache_metadata::models::NarInfo>| {
            rows.into_iter().map(|ni| ni.id).collect::<Vec<_>>()
        };

        assert!(store.get_least_used_nar_infos(499).await.unwrap().is_empty());
        assert_eq!(
            ids(store.get_least_used_nar_infos(500).await.unwrap()),
            vec![linked.id]
        );
        assert_eq!(
            ids(store.get_least_used_nar_infos(4595).await.unwrap()),
            vec![linked.id]
        );
        assert_eq!(
            ids(store.get_least_used_nar_infos(4596).await.unwrap()),
            vec![linked.id, unlinked.id, placeholder.id]
        );
    })
    .await;
}

#[tokio::test]
async fn test_orphan_gc() {
    run_metadata_test_all(|store| async move {
        let kept_hash = test_hash("gc-kept");
        let kept_ni = store
            .create_nar_info(&migrated_nar_info(&kept_hash))
            .await
            .unwrap();
        let kept_nf = store
            .create_nar_file(&nar_file(&kept_hash, "xz", 10))
            .await
            .unwrap();
        store
            .link_nar_info_to_nar_file(kept_ni.id, kept_nf.id)
            .await
            .unwrap();
        let kept_chunk = store.create_chunk(&chunk("gc-kept", 10)).await.unwrap();
        store
            .link_nar_file_to_chunk(kept_nf.id, kept_chunk.id, 0)
            .await
            .unwrap();

        let orphan_ni = store
            .create_nar_info(&migrated_nar_info(&test_hash("gc-orphan")))
            .await
            .unwrap();
        let orphan_nf = store
            .create_nar_file(&nar_file(&test_hash("gc-orphan-nar"), "xz", 10))
            .await
            .unwrap();
        let orphan_chunk = store.create_chunk(&chunk("gc-orphan", 10)).await.unwrap();
        // Only referenced by the orphaned NAR file.
        let stranded_chunk = store
            .create_chunk(&chunk("gc-stranded", 10))
            .await
            .unwrap();
        store
            .link_nar_file_to_chunk(orphan_nf.id, stranded_chunk.id, 0)
            .await
            .unwrap();

        let orphaned_nis = store.get_orphaned_nar_infos().await.unwrap();
        assert_eq!(orphaned_nis.len(), 1);
        assert_eq!(orphaned_nis[0].id, orphan_ni.id);

        let orphaned_nfs = store.get_orphaned_nar_files().await.unwrap();
        assert_eq!(orphaned_nfs.len(), 1);
        assert_eq!(orphaned_nfs[0].id, orphan_nf.id);

        let orphaned_chunks = store.get_orphaned_chunks().await.unwrap();
        assert_eq!(orphaned_chunks.len(), 1);
        assert_eq!(orphaned_chunks[0].id, orphan_chunk.id);

        assert_eq!(store.delete_orphaned_nar_infos().await.unwrap(), 1);
        assert_eq!(store.delete_orphaned_nar_files().await.unwrap(), 1);
        assert_eq!(store.delete_orphaned_nar_infos().await.unwrap(), 0);
        assert_eq!(store.delete_orphaned_nar_files().await.unwrap(), 0);

        // Removing the orphaned NAR file released its chunk.
        let orphaned_chunks: Vec<i64> = store
            .get_orphaned_chunks()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(orphaned_chunks, vec![orphan_chunk.id, stranded_chunk.id]);
        assert_eq!(store.delete_orphaned_chunks().await.unwrap(), 2);
        assert!(store.get_orphaned_chunks().await.unwrap().is_empty());

        assert_eq!(store.get_nar_info_count().await.unwrap(), 1);
        assert_eq!(store.get_nar_file_count().await.unwrap(), 1);
        assert_eq!(store.get_chunk_count().await.unwrap(), 1);
        assert_eq!(
            store.get_chunks_by_nar_file_id(kept_nf.id).await.unwrap()[0].id,
            kept_chunk.id
        );
    })
    .await;
}

#[tokio::test]
async fn test_budgets_beyond_i64_select_everything() {
    run_metadata_test_all(|store| async move {
        let hash = test_hash("huge-budget");
        let ni = store
            .create_nar_info(&migrated_nar_info(&hash))
            .await
            .unwrap();
        let nf = store
            .create_nar_file(&nar_file(&hash, "xz", 10))
            .await
            .unwrap();
        store.link_nar_info_to_nar_file(ni.id, nf.id).await.unwrap();
        tick().await;

        let files = store.get_least_used_nar_files(u64::MAX).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, nf.id);

        let infos = store.get_least_used_nar_infos(u64::MAX).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, ni.id);

        assert_eq!(
            store
                .get_migrated_nar_info_hashes_paginated(u64::MAX, 0)
                .await
                .unwrap(),
            vec![hash.clone()]
        );
        assert!(store
            .get_migrated_nar_info_hashes_paginated(10, u64::MAX)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_old_compressed_nar_files(Timestamp::now(), u64::MAX, 0)
                .await
                .unwrap()
                .len(),
            1
        );
    })
    .await;
}
