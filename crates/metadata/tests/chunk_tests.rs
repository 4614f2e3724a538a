//! Chunk and chunk-link contract tests, run against every available backend.

mod common;

use common::{chunk, nar_file, run_metadata_test_all, test_hash};
use narcache_metadata::models::Chunk;
use narcache_metadata::{ErrorKind, MetadataStore, is_not_found_error};

async fn create_chunks(store: &dyn MetadataStore, prefix: &str, count: usize) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(count);
    for i in 0..count {
        let created = store
            .create_chunk(&chunk(&format!("{prefix}-{i}"), 1000 + i as u32))
            .await
            .expect("Create chunk failed");
        chunks.push(created);
    }
    chunks
}

fn ids(chunks: &[Chunk]) -> Vec<i64> {
    chunks.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn test_create_chunk_is_idempotent() {
    run_metadata_test_all(|store| async move {
        let params = chunk("idempotent", 65536);
        let first = store.create_chunk(&params).await.unwrap();
        let second = store.create_chunk(&params).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first, second);
        assert_eq!(first.size, 65536);
        assert_eq!(store.get_chunk_by_hash(&params.hash).await.unwrap(), first);
        assert_eq!(store.get_chunk_by_id(first.id).await.unwrap(), first);
        assert_eq!(store.get_chunk_count().await.unwrap(), 1);

        assert!(is_not_found_error(
            &store.get_chunk_by_hash("missing").await.unwrap_err()
        ));
    })
    .await;
}

#[tokio::test]
async fn test_bulk_link_is_idempotent_and_ordered() {
    run_metadata_test_all(|store| async move {
        let nf = store
            .create_nar_file(&nar_file(&test_hash("bulk"), "", 3000))
            .await
            .unwrap();
        let chunks = create_chunks(store.as_ref(), "bulk", 3).await;

        // Insert out of order; reads come back by index.
        let chunk_ids = vec![chunks[2].id, chunks[0].id, chunks[1].id];
        let chunk_indices = vec![2, 0, 1];
        store
            .link_nar_file_to_chunks(nf.id, &chunk_ids, &chunk_indices)
            .await
            .unwrap();
        store
            .link_nar_file_to_chunks(nf.id, &chunk_ids, &chunk_indices)
            .await
            .unwrap();

        let linked = store.get_chunks_by_nar_file_id(nf.id).await.unwrap();
        assert_eq!(ids(&linked), ids(&chunks));

        for (index, expected) in chunks.iter().enumerate() {
            let found = store
                .get_chunk_by_nar_file_id_and_index(nf.id, index as i64)
                .await
                .unwrap();
            assert_eq!(&found, expected);
        }
        assert!(is_not_found_error(
            &store
                .get_chunk_by_nar_file_id_and_index(nf.id, 3)
                .await
                .unwrap_err()
        ));
    })
    .await;
}

#[tokio::test]
async fn test_single_link_and_sparse_indices() {
    run_metadata_test_all(|store| async move {
        let nf = store
            .create_nar_file(&nar_file(&test_hash("sparse"), "", 3000))
            .await
            .unwrap();
        let chunks = create_chunks(store.as_ref(), "sparse", 3).await;

        store
            .link_nar_file_to_chunk(nf.id, chunks[1].id, 40)
            .await
            .unwrap();
        store
            .link_nar_file_to_chunk(nf.id, chunks[0].id, 7)
            .await
            .unwrap();
        store
            .link_nar_file_to_chunk(nf.id, chunks[2].id, 1000)
            .await
            .unwrap();
        store
            .link_nar_file_to_chunk(nf.id, chunks[0].id, 7)
            .await
            .unwrap();

        let linked = store.get_chunks_by_nar_file_id(nf.id).await.unwrap();
        assert_eq!(ids(&linked), ids(&chunks));
    })
    .await;
}

#[tokio::test]
async fn test_bulk_link_rejects_mismatched_lengths() {
    run_metadata_test_all(|store| async move {
        let nf = store
            .create_nar_file(&nar_file(&test_hash("mismatch"), "", 3000))
            .await
            .unwrap();
        let chunks = create_chunks(store.as_ref(), "mismatch", 3).await;

        let err = store
            .link_nar_file_to_chunks(nf.id, &ids(&chunks), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MismatchedInputLengths);

        let err = store
            .link_nar_file_to_chunks(nf.id, &ids(&chunks), &[0, 1])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MismatchedInputLengths);

        assert!(store
            .get_chunks_by_nar_file_id(nf.id)
            .await
            .unwrap()
            .is_empty());

        // Empty on both sides is a no-op.
        store.link_nar_file_to_chunks(nf.id, &[], &[]).await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_bulk_link_spans_batches() {
    run_metadata_test_all(|store| async move {
        let nf = store
            .create_nar_file(&nar_file(&test_hash("large"), "", 1))
            .await
            .unwrap();
        let chunks = create_chunks(store.as_ref(), "large", 650).await;
        let indices: Vec<i64> = (0..chunks.len() as i64).collect();

        store
            .link_nar_file_to_chunks(nf.id, &ids(&chunks), &indices)
            .await
            .unwrap();

        let linked = store.get_chunks_by_nar_file_id(nf.id).await.unwrap();
        assert_eq!(ids(&linked), ids(&chunks));
    })
    .await;
}

#[tokio::test]
async fn test_chunk_totals_and_delete() {
    run_metadata_test_all(|store| async move {
        assert_eq!(store.get_total_chunk_size().await.unwrap(), 0);

        let nf = store
            .create_nar_file(&nar_file(&test_hash("totals"), "", 3000))
            .await
            .unwrap();
        let chunks = create_chunks(store.as_ref(), "totals", 3).await;
        store
            .link_nar_file_to_chunks(nf.id, &ids(&chunks), &[0, 1, 2])
            .await
            .unwrap();

        assert_eq!(store.get_chunk_count().await.unwrap(), 3);
        assert_eq!(store.get_total_chunk_size().await.unwrap(), 1000 + 1001 + 1002);

        assert_eq!(store.delete_chunk_by_id(chunks[1].id).await.unwrap(), 1);
        assert_eq!(store.delete_chunk_by_id(chunks[1].id).await.unwrap(), 0);
        let linked = store.get_chunks_by_nar_file_id(nf.id).await.unwrap();
        assert_eq!(ids(&linked), vec![chunks[0].id, chunks[2].id]);
        assert_eq!(store.get_chunk_count().await.unwrap(), 2);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_chunk_and_nar_file_creators_agree() {
    run_metadata_test_all(|store| async move {
        let hash = test_hash("contended-nar");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let hash = hash.clone();
            handles.push(tokio::spawn(async move {
                let nf = store.create_nar_file(&nar_file(&hash, "xz", 10)).await?;
                let c = store.create_chunk(&chunk("contended-chunk", 10)).await?;
                Ok::<_, narcache_metadata::MetadataError>((nf.id, c.id))
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(
                handle
                    .await
                    .expect("Creator task panicked")
                    .expect("Concurrent create must not fail"),
            );
        }
        assert!(results.iter().all(|r| *r == results[0]));
        assert_eq!(store.get_nar_file_count().await.unwrap(), 1);
        assert_eq!(store.get_chunk_count().await.unwrap(), 1);
    })
    .await;
}
