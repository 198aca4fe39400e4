//! Durable-backend behavior: round-trips, atomic replacement, ranking, and
//! the dimension pin, against a real sqlite-vec database on disk.

use std::sync::Arc;

use lorekeep::chunking::ChunkingConfig;
use lorekeep::embeddings::MockEmbeddingProvider;
use lorekeep::manager::KnowledgeBase;
use lorekeep::retrieval::Retriever;
use lorekeep::stores::{IndexEntry, SqliteVectorStore, VectorStore};
use lorekeep::types::KbError;

const DIM: usize = 4;

fn entry(document_id: &str, seq: usize, embedding: Vec<f32>) -> IndexEntry {
    IndexEntry {
        chunk_id: format!("{document_id}#{seq}"),
        document_id: document_id.to_string(),
        sequence_index: seq,
        start_offset: 0,
        end_offset: 1,
        text: format!("chunk {seq} of {document_id}"),
        embedding,
        metadata: serde_json::json!({"source": document_id}),
    }
}

async fn open_store(dir: &tempfile::TempDir) -> SqliteVectorStore {
    SqliteVectorStore::open(dir.path().join("kb.sqlite"), DIM)
        .await
        .unwrap()
}

#[tokio::test]
async fn upsert_search_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert(vec![
            entry("doc", 0, vec![1.0, 0.0, 0.0, 0.0]),
            entry("doc", 1, vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();

    let hits = store.search(&[0.0, 1.0, 0.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "doc#1");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[1].score < hits[0].score);
    assert_eq!(hits[0].metadata["source"], "doc");
    assert_eq!(hits[0].sequence_index, 1);
}

#[tokio::test]
async fn upsert_replaces_rows_with_the_same_chunk_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert(vec![entry("doc", 0, vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .unwrap();
    store
        .upsert(vec![entry("doc", 0, vec![0.0, 0.0, 0.0, 1.0])])
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    let hits = store.search(&[0.0, 0.0, 0.0, 1.0], 1).await.unwrap();
    assert_eq!(hits[0].chunk_id, "doc#0");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn ties_break_by_insertion_recency() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let same = vec![0.5, 0.5, 0.0, 0.0];
    store.upsert(vec![entry("first", 0, same.clone())]).await.unwrap();
    store.upsert(vec![entry("second", 0, same.clone())]).await.unwrap();

    let hits = store.search(&same, 2).await.unwrap();
    assert_eq!(hits[0].document_id, "second");
    assert_eq!(hits[1].document_id, "first");
}

#[tokio::test]
async fn replace_document_is_an_atomic_swap() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert(vec![
            entry("doc", 0, vec![1.0, 0.0, 0.0, 0.0]),
            entry("doc", 1, vec![0.0, 1.0, 0.0, 0.0]),
            entry("doc", 2, vec![0.0, 0.0, 1.0, 0.0]),
        ])
        .await
        .unwrap();

    store
        .replace_document(
            "doc",
            vec![
                entry("doc", 0, vec![0.0, 0.0, 0.0, 1.0]),
                entry("doc", 1, vec![0.0, 0.0, 1.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 2);
    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs[0].chunk_count, 2);

    // The old vector for doc#0 is gone, not merely shadowed.
    let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 3).await.unwrap();
    assert!(hits.iter().all(|hit| hit.score < 0.999));
}

#[tokio::test]
async fn replace_rejects_entries_of_other_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let err = store
        .replace_document("doc", vec![entry("other", 0, vec![0.0; DIM])])
        .await
        .unwrap_err();
    assert!(matches!(err, KbError::InvalidArgument(_)));
}

#[tokio::test]
async fn delete_by_document_is_idempotent_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    store
        .upsert(vec![
            entry("keep", 0, vec![1.0, 0.0, 0.0, 0.0]),
            entry("drop", 0, vec![0.0, 1.0, 0.0, 0.0]),
            entry("drop", 1, vec![0.0, 0.0, 1.0, 0.0]),
        ])
        .await
        .unwrap();

    assert_eq!(store.delete_by_document("drop").await.unwrap(), 2);
    assert_eq!(store.delete_by_document("drop").await.unwrap(), 0);
    assert_eq!(store.delete_by_document("ghost").await.unwrap(), 0);

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].document_id, "keep");

    let hits = store.search(&[0.0, 1.0, 0.0, 0.0], 10).await.unwrap();
    assert!(hits.iter().all(|hit| hit.document_id != "drop"));
}

#[tokio::test]
async fn dimension_guards_cover_reads_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store
        .upsert(vec![entry("doc", 0, vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .unwrap();

    let err = store.search(&[1.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, KbError::DimensionMismatch { .. }));

    let err = store
        .upsert(vec![entry("doc", 1, vec![1.0, 0.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, KbError::DimensionMismatch { .. }));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn zero_top_k_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let err = store.search(&[0.0; DIM], 0).await.unwrap_err();
    assert!(matches!(err, KbError::InvalidArgument(_)));
}

#[tokio::test]
async fn data_survives_reopen_and_the_dimension_is_pinned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.sqlite");

    {
        let store = SqliteVectorStore::open(&path, DIM).await.unwrap();
        store
            .upsert(vec![entry("doc", 0, vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
    }

    let reopened = SqliteVectorStore::open(&path, DIM).await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 1);
    let hits = reopened.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(hits[0].chunk_id, "doc#0");

    let err = SqliteVectorStore::open(&path, DIM + 1).await.unwrap_err();
    assert!(matches!(
        err,
        KbError::DimensionMismatch {
            expected: 4,
            actual: 5
        }
    ));
}

#[tokio::test]
async fn full_pipeline_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(MockEmbeddingProvider::with_dimension(DIM));
    let store = Arc::new(
        SqliteVectorStore::open(dir.path().join("kb.sqlite"), DIM)
            .await
            .unwrap(),
    );
    let kb = KnowledgeBase::new(
        store.clone(),
        embedder.clone(),
        ChunkingConfig::new(2, 0),
    )
    .unwrap();

    kb.add_document("doc1", "A B C D E").await.unwrap();
    kb.add_document("doc1", "A B C D E").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 3);

    let retriever = Retriever::new(store.clone(), embedder);
    let result = retriever.retrieve("C D", 1).await.unwrap();
    assert_eq!(result.hits[0].chunk_id, "doc1#1");
    assert_eq!(result.citations.len(), 1);
    assert_eq!(result.citations[0].document_id, "doc1");

    kb.delete_document("doc1").await.unwrap();
    assert!(kb.list_documents().await.unwrap().is_empty());
    assert!(retriever.retrieve("C D", 1).await.unwrap().is_empty());
}
