//! NAR file contract tests, run against every available backend.

mod common;

use common::{migrated_nar_info, nar_file, run_metadata_test_all, test_hash, tick};
use narcache_metadata::is_not_found_error;
use narcache_metadata::models::{CreateNarFileParams, NarFileKey, Timestamp};

#[tokio::test]
async fn test_create_nar_file_is_idempotent() {
    run_metadata_test_all(|store| async move {
        let hash = test_hash("nar-idempotent");
        let first = store
            .create_nar_file(&nar_file(&hash, "xz", 1024))
            .await
            .expect("Create nar file failed");
        let second = store
            .create_nar_file(&nar_file(&hash, "xz", 1024))
            .await
            .expect("Second create must not fail");

        assert_eq!(first.id, second.id);
        assert_eq!(first, second);
        assert_eq!(first.file_size, 1024);
        assert_eq!(first.total_chunks, 0);
        assert!(!first.is_chunked());
        assert_eq!(first.created_at, first.last_accessed_at);
        assert!(first.updated_at.is_none());
        assert!(first.chunking_started_at.is_none());
        assert!(first.verified_at.is_none());
        assert_eq!(store.get_nar_file_count().await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_variants_are_independent() {
    run_metadata_test_all(|store| async move {
        let hash = test_hash("variants");
        let xz = store
            .create_nar_file(&nar_file(&hash, "xz", 100))
            .await
            .unwrap();
        let zstd = store
            .create_nar_file(&nar_file(&hash, "zstd", 120))
            .await
            .unwrap();
        let with_query = store
            .create_nar_file(&CreateNarFileParams {
                query: "hash=abc".to_string(),
                ..nar_file(&hash, "xz", 100)
            })
            .await
            .unwrap();

        assert_ne!(xz.id, zstd.id);
        assert_ne!(xz.id, with_query.id);
        assert_ne!(zstd.id, with_query.id);
        assert_eq!(store.get_nar_file_count().await.unwrap(), 3);

        // The lowest id wins when looking up by hash alone.
        assert_eq!(store.get_nar_file_by_hash(&hash).await.unwrap().id, xz.id);

        assert_eq!(store.delete_nar_file_by_key(&xz.key()).await.unwrap(), 1);
        assert_eq!(store.delete_nar_file_by_key(&xz.key()).await.unwrap(), 0);
        assert!(is_not_found_error(
            &store.get_nar_file_by_key(&xz.key()).await.unwrap_err()
        ));
        assert_eq!(
            store.get_nar_file_by_key(&zstd.key()).await.unwrap(),
            zstd
        );
        assert_eq!(
            store
                .get_nar_file_by_key(&NarFileKey::new(&hash, "xz", "hash=abc"))
                .await
                .unwrap(),
            with_query
        );

        assert_eq!(store.delete_nar_file_by_id(zstd.id).await.unwrap(), 1);
        assert_eq!(store.delete_nar_file_by_id(zstd.id).await.unwrap(), 0);
        assert_eq!(store.get_nar_file_count().await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_touch_nar_file() {
    run_metadata_test_all(|store| async move {
        let created = store
            .create_nar_file(&nar_file(&test_hash("touch-nar"), "", 64))
            .await
            .unwrap();

        tick().await;
        assert_eq!(store.touch_nar_file(&created.key()).await.unwrap(), 1);
        let touched = store.get_nar_file_by_id(created.id).await.unwrap();
        assert_eq!(touched.updated_at, Some(touched.last_accessed_at));
        assert_ne!(touched.last_accessed_at, touched.created_at);

        let missing = NarFileKey::new(test_hash("touch-nar"), "zstd", "");
        assert_eq!(store.touch_nar_file(&missing).await.unwrap(), 0);
    })
    .await;
}

#[tokio::test]
async fn test_nar_file_lookup_by_nar_info() {
    run_metadata_test_all(|store| async move {
        let hash = test_hash("linked-nar");
        let ni = store
            .create_nar_info(&migrated_nar_info(&hash))
            .await
            .unwrap();
        let nf = store
            .create_nar_file(&nar_file(&hash, "xz", 4096))
            .await
            .unwrap();

        assert!(is_not_found_error(
            &store.get_nar_file_by_nar_info_id(ni.id).await.unwrap_err()
        ));
        store.link_nar_info_to_nar_file(ni.id, nf.id).await.unwrap();
        assert_eq!(store.get_nar_file_by_nar_info_id(ni.id).await.unwrap(), nf);
        assert!(is_not_found_error(
            &store.get_nar_file_by_id(nf.id + 1000).await.unwrap_err()
        ));
    })
    .await;
}

#[tokio::test]
async fn test_chunking_bookkeeping() {
    run_metadata_test_all(|store| async move {
        let first = store
            .create_nar_file(&nar_file(&test_hash("chunk-a"), "", 300))
            .await
            .unwrap();
        let second = store
            .create_nar_file(&nar_file(&test_hash("chunk-b"), "", 500))
            .await
            .unwrap();

        assert!(!store.has_any_chunked_nar_files().await.unwrap());
        assert_eq!(store.get_nar_files_to_chunk_count().await.unwrap(), 2);
        let queued = store.get_nar_files_to_chunk(1).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, first.id);

        assert_eq!(
            store.set_nar_file_chunking_started(first.id).await.unwrap(),
            1
        );
        assert_eq!(
            store.update_nar_file_total_chunks(first.id, 5).await.unwrap(),
            1
        );
        let chunked = store.get_nar_file_by_id(first.id).await.unwrap();
        assert_eq!(chunked.total_chunks, 5);
        assert!(chunked.is_chunked());
        assert!(chunked.chunking_started_at.is_some());

        let verified_at = Timestamp::now();
        assert_eq!(
            store
                .update_nar_file_verified_at(second.id, verified_at)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store.get_nar_file_by_id(second.id).await.unwrap().verified_at,
            Some(verified_at)
        );

        assert!(store.has_any_chunked_nar_files().await.unwrap());
        assert_eq!(store.get_nar_files_to_chunk_count().await.unwrap(), 1);
        let queued = store.get_nar_files_to_chunk(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, second.id);

        assert_eq!(store.get_nar_total_size().await.unwrap(), 800);
        assert_eq!(
            store.update_nar_file_total_chunks(9999, 1).await.unwrap(),
            0
        );
    })
    .await;
}

#[tokio::test]
async fn test_old_compressed_nar_files() {
    run_metadata_test_all(|store| async move {
        assert_eq!(store.get_nar_total_size().await.unwrap(), 0);

        let xz = store
            .create_nar_file(&nar_file(&test_hash("old-xz"), "xz", 10))
            .await
            .unwrap();
        store
            .create_nar_file(&nar_file(&test_hash("old-plain"), "", 10))
            .await
            .unwrap();
        store
            .create_nar_file(&nar_file(&test_hash("old-none"), "none", 10))
            .await
            .unwrap();
        let zstd = store
            .create_nar_file(&nar_file(&test_hash("old-zstd"), "zstd", 10))
            .await
            .unwrap();

        tick().await;
        let cutoff = Timestamp::now();
        tick().await;
        store
            .create_nar_file(&nar_file(&test_hash("new-xz"), "xz", 10))
            .await
            .unwrap();

        let old: Vec<i64> = store
            .get_old_compressed_nar_files(cutoff, 10, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|nf| nf.id)
            .collect();
        assert_eq!(old, vec![xz.id, zstd.id]);

        let page = store
            .get_old_compressed_nar_files(cutoff, 1, 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, zstd.id);
    })
    .await;
}
