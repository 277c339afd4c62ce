//! Write path to read path: publish segments from the indexer, refresh a
//! searcher replica, and query through it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use shoal::indexer::{IndexMapping, Indexer};
use shoal::models::StructuredQuery;
use shoal::searcher::{LocalSearcher, ShardSearcher};
use shoal::storage::LocalSegmentStore;

fn attrs(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().unwrap().clone()
}

fn searcher_for(tmp: &TempDir, store: Arc<LocalSegmentStore>) -> LocalSearcher {
    LocalSearcher::open(
        0,
        "corpus",
        tmp.path().join("cache"),
        store,
        &IndexMapping::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn published_segment_becomes_searchable_after_refresh() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());

    let indexer = Indexer::open(
        tmp.path().join("corpus"),
        IndexMapping::default(),
        vec![],
        store.clone(),
    )
    .unwrap();
    indexer
        .index(
            "doc1",
            &attrs(json!({"title": "distributed search", "url": "http://x/1"})),
        )
        .await
        .unwrap();
    indexer.commit_and_upload().await.unwrap();
    indexer.close().await.unwrap();

    let searcher = searcher_for(&tmp, store);
    assert!(searcher.refresh_once().await.unwrap());

    let ctx = CancellationToken::new();
    let results = searcher
        .search(&ctx, &StructuredQuery::from_keywords(vec!["distributed".into()]))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "doc1");
    assert_eq!(results[0].url, "http://x/1");
}

#[tokio::test]
async fn upsert_then_commit_serves_only_the_latest_version() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
    let indexer = Indexer::open(
        tmp.path().join("corpus"),
        IndexMapping::default(),
        vec![],
        store.clone(),
    )
    .unwrap();

    // v1 published in the first segment.
    indexer
        .index("d", &attrs(json!({"title": "version one"})))
        .await
        .unwrap();
    indexer.commit_and_upload().await.unwrap();

    let searcher = searcher_for(&tmp, store.clone());
    searcher.refresh_once().await.unwrap();
    let first_segment = searcher.serving_segment().unwrap();

    // v2 overwrites and lands in a strictly newer segment. The timestamp
    // has second resolution, so force a distinct one.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    indexer
        .index("d", &attrs(json!({"title": "version two"})))
        .await
        .unwrap();
    indexer.commit_and_upload().await.unwrap();
    indexer.close().await.unwrap();

    assert!(searcher.refresh_once().await.unwrap());
    assert_ne!(searcher.serving_segment().unwrap(), first_segment);

    let ctx = CancellationToken::new();
    let results = searcher
        .search(&ctx, &StructuredQuery::from_keywords(vec!["version".into()]))
        .await
        .unwrap();
    assert_eq!(results.len(), 1, "upsert must not leave the old version behind");
    assert_eq!(results[0].title, "version two");
}

#[tokio::test]
async fn bulk_index_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
    let indexer = Indexer::open(
        tmp.path().join("corpus"),
        IndexMapping::default(),
        vec![],
        store.clone(),
    )
    .unwrap();

    let mut batch = BTreeMap::new();
    batch.insert("a".to_string(), attrs(json!({"title": "alpha item"})));
    batch.insert("b".to_string(), attrs(json!({"title": "beta item"})));

    indexer.bulk_index(&batch).await.unwrap();
    indexer.bulk_index(&batch).await.unwrap();
    indexer.commit_and_upload().await.unwrap();
    indexer.close().await.unwrap();

    let searcher = searcher_for(&tmp, store);
    searcher.refresh_once().await.unwrap();

    let ctx = CancellationToken::new();
    let results = searcher
        .search(&ctx, &StructuredQuery::from_keywords(vec!["item".into()]))
        .await
        .unwrap();
    // The identical second batch must not duplicate documents.
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn delete_then_commit_removes_the_document() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(LocalSegmentStore::new(tmp.path().join("store")).unwrap());
    let indexer = Indexer::open(
        tmp.path().join("corpus"),
        IndexMapping::default(),
        vec![],
        store.clone(),
    )
    .unwrap();

    indexer
        .index("gone", &attrs(json!({"title": "ephemeral entry"})))
        .await
        .unwrap();
    indexer.delete("gone").await.unwrap();
    // Deleting again is not an error.
    indexer.delete("gone").await.unwrap();
    indexer.commit_and_upload().await.unwrap();
    indexer.close().await.unwrap();

    let searcher = searcher_for(&tmp, store);
    searcher.refresh_once().await.unwrap();

    let ctx = CancellationToken::new();
    let results = searcher
        .search(&ctx, &StructuredQuery::from_keywords(vec!["ephemeral".into()]))
        .await
        .unwrap();
    assert!(results.is_empty());
}
