//! End-to-end drain behavior against a mock remote index.

use httpmock::prelude::*;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use index_relay::client::IngestionClient;
use index_relay::config::{ApiConfig, Config, DbConfig, IndexingConfig, RecordsConfig};
use index_relay::credentials::{Credential, CredentialStore};
use index_relay::db;
use index_relay::document::DocumentBuilder;
use index_relay::indexer::BatchIndexer;
use index_relay::models::{ContentRecord, Operation};
use index_relay::queue::{IndexQueue, CONTENT_INDEX_QUEUE};
use index_relay::records::{JsonRecordStore, StoredViewRenderer};

struct Harness {
    indexer: BatchIndexer,
    queue: IndexQueue,
    _dir: TempDir,
}

fn write_record(root: &Path, id: &str, bundle: &str, published: bool) {
    let record = serde_json::json!({
        "id": id,
        "bundle": bundle,
        "title": format!("Record {}", id),
        "path": format!("/content/{}", id),
        "published": published,
        "references": [],
        "views": { "full": format!("<p>Body of {}</p>", id) },
    });
    std::fs::write(root.join(format!("{}.json", id)), record.to_string()).unwrap();
}

async fn bare_pool(dir: &TempDir) -> SqlitePool {
    let cfg = Config {
        db: DbConfig {
            path: dir.path().join("relay.sqlite"),
        },
        api: ApiConfig::default(),
        indexing: Default::default(),
        oauth: Default::default(),
        records: None,
    };
    let pool = db::connect(&cfg).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

async fn connected_pool(dir: &TempDir) -> SqlitePool {
    let pool = bare_pool(dir).await;

    CredentialStore::new(pool.clone())
        .store(&Credential {
            bearer_token: "test-token".to_string(),
            site_id: "site-1".to_string(),
            site_name: "Test Site".to_string(),
            base_url: "https://example.com".to_string(),
            org_id: "org-1".to_string(),
            org_name: "Test Org".to_string(),
            available_sites: Vec::new(),
        })
        .await
        .unwrap();

    pool
}

async fn build_harness(
    server: &MockServer,
    batch_size: usize,
    realtime: bool,
    connected: bool,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let records_root = dir.path().join("records");
    std::fs::create_dir_all(&records_root).unwrap();

    let pool = if connected {
        connected_pool(&dir).await
    } else {
        bare_pool(&dir).await
    };
    let queue = IndexQueue::new(pool.clone(), CONTENT_INDEX_QUEUE);
    let client = IngestionClient::new(server.base_url(), CredentialStore::new(pool));

    let config = IndexingConfig {
        enabled: true,
        realtime,
        content_types: vec!["article".to_string()],
        batch_size,
        ..Default::default()
    };

    let store = Arc::new(
        JsonRecordStore::new(&RecordsConfig {
            root: records_root,
        })
        .unwrap(),
    );

    let indexer = BatchIndexer::new(
        config,
        DocumentBuilder::new(),
        client,
        queue.clone(),
        store,
        Arc::new(StoredViewRenderer),
    );

    Harness {
        indexer,
        queue,
        _dir: dir,
    }
}

async fn harness(server: &MockServer, batch_size: usize) -> Harness {
    build_harness(server, batch_size, false, true).await
}

fn records_root(h: &Harness) -> std::path::PathBuf {
    h._dir.path().join("records")
}

#[tokio::test]
async fn drain_splits_the_limit_into_submission_batches() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(200)
                .json_body(serde_json::json!({ "queued": true }));
        })
        .await;

    let h = harness(&server, 50).await;
    for i in 0..120 {
        write_record(&records_root(&h), &format!("r{:03}", i), "article", true);
    }
    assert_eq!(h.indexer.enqueue_all().await.unwrap(), 120);

    let processed = h.indexer.drain(100, Some(50)).await.unwrap();

    assert_eq!(processed, 100);
    assert_eq!(h.queue.size().await.unwrap(), 20);
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn failed_batches_are_dropped_from_the_queue() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(500).body("internal error");
        })
        .await;

    let h = harness(&server, 50).await;
    for i in 0..5 {
        write_record(&records_root(&h), &format!("r{}", i), "article", true);
    }
    assert_eq!(h.indexer.enqueue_all().await.unwrap(), 5);

    // The failure is absorbed and the batch is still committed.
    let processed = h.indexer.drain(100, None).await.unwrap();

    assert_eq!(processed, 5);
    assert_eq!(h.queue.size().await.unwrap(), 0);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn missing_and_excluded_records_commit_without_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(200);
        })
        .await;

    let h = harness(&server, 50).await;
    write_record(&records_root(&h), "draft", "article", false);
    write_record(&records_root(&h), "page", "page", true);

    h.queue.enqueue("ghost", Operation::Index).await.unwrap();
    h.queue.enqueue("draft", Operation::Index).await.unwrap();
    h.queue.enqueue("page", Operation::Index).await.unwrap();

    let processed = h.indexer.drain(100, None).await.unwrap();

    assert_eq!(processed, 3);
    assert_eq!(h.queue.size().await.unwrap(), 0);
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn queued_deletes_are_resolved_individually() {
    let server = MockServer::start_async().await;
    let delete_mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/sites/site-1/pages");
            then.status(200);
        })
        .await;

    let h = harness(&server, 50).await;
    write_record(&records_root(&h), "gone-soon", "article", true);

    h.queue.enqueue("gone-soon", Operation::Delete).await.unwrap();
    // A delete whose record already vanished commits without a remote call.
    h.queue.enqueue("never-existed", Operation::Delete).await.unwrap();

    let processed = h.indexer.drain(100, None).await.unwrap();

    assert_eq!(processed, 2);
    assert_eq!(h.queue.size().await.unwrap(), 0);
    delete_mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn failed_deletes_are_still_committed() {
    let server = MockServer::start_async().await;
    let delete_mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/sites/site-1/pages");
            then.status(502).body("bad gateway");
        })
        .await;

    let h = harness(&server, 50).await;
    write_record(&records_root(&h), "sticky", "article", true);
    h.queue.enqueue("sticky", Operation::Delete).await.unwrap();

    let processed = h.indexer.drain(100, None).await.unwrap();

    assert_eq!(processed, 1);
    assert_eq!(h.queue.size().await.unwrap(), 0);
    delete_mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn enqueue_all_applies_the_indexing_policy() {
    let server = MockServer::start_async().await;
    let h = harness(&server, 50).await;

    write_record(&records_root(&h), "a", "article", true);
    write_record(&records_root(&h), "b", "article", false);
    write_record(&records_root(&h), "c", "page", true);

    assert_eq!(h.indexer.enqueue_all().await.unwrap(), 1);
    assert_eq!(h.queue.size().await.unwrap(), 1);
}

#[tokio::test]
async fn enqueue_all_replaces_the_existing_backlog() {
    let server = MockServer::start_async().await;
    let h = harness(&server, 50).await;

    write_record(&records_root(&h), "a", "article", true);

    h.queue.enqueue("stale-1", Operation::Index).await.unwrap();
    h.queue.enqueue("stale-2", Operation::Index).await.unwrap();

    assert_eq!(h.indexer.enqueue_all().await.unwrap(), 1);
    assert_eq!(h.queue.size().await.unwrap(), 1);
}

#[tokio::test]
async fn index_record_submits_one_page_immediately() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(200)
                .json_body(serde_json::json!({ "queued": true }));
        })
        .await;

    let h = harness(&server, 50).await;
    write_record(&records_root(&h), "solo", "article", true);

    assert!(h.indexer.index_record("solo").await.unwrap());
    assert!(!h.indexer.index_record("absent").await.unwrap());
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn index_record_absorbs_delivery_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(503);
        })
        .await;

    let h = harness(&server, 50).await;
    write_record(&records_root(&h), "solo", "article", true);

    assert!(!h.indexer.index_record("solo").await.unwrap());
}

#[tokio::test]
async fn realtime_saves_are_indexed_immediately() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(200)
                .json_body(serde_json::json!({ "queued": true }));
        })
        .await;

    let h = build_harness(&server, 50, true, true).await;
    write_record(&records_root(&h), "rt", "article", true);

    h.indexer.record_saved("rt").await.unwrap();

    assert_eq!(h.queue.size().await.unwrap(), 0);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn deferred_saves_enqueue_instead_of_submitting() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sites/site-1/pages");
            then.status(200);
        })
        .await;

    let h = build_harness(&server, 50, false, true).await;
    write_record(&records_root(&h), "later", "article", true);
    write_record(&records_root(&h), "draft", "article", false);

    h.indexer.record_saved("later").await.unwrap();
    // Saves that fail the indexing policy are ignored entirely.
    h.indexer.record_saved("draft").await.unwrap();

    assert_eq!(h.queue.size().await.unwrap(), 1);
    mock.assert_hits_async(0).await;
}

fn deleted_record(id: &str) -> ContentRecord {
    ContentRecord {
        id: id.to_string(),
        bundle: "article".to_string(),
        title: format!("Record {}", id),
        path: format!("/content/{}", id),
        published: true,
        references: Vec::new(),
        views: Default::default(),
    }
}

#[tokio::test]
async fn realtime_deletes_target_the_remote_directly() {
    let server = MockServer::start_async().await;
    let delete_mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/sites/site-1/pages");
            then.status(200);
        })
        .await;

    let h = build_harness(&server, 50, true, true).await;

    h.indexer.record_deleted(&deleted_record("bye")).await.unwrap();

    assert_eq!(h.queue.size().await.unwrap(), 0);
    delete_mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn deferred_deletes_enqueue_for_the_next_drain() {
    let server = MockServer::start_async().await;
    let delete_mock = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/sites/site-1/pages");
            then.status(200);
        })
        .await;

    let h = build_harness(&server, 50, false, true).await;

    h.indexer.record_deleted(&deleted_record("bye")).await.unwrap();

    assert_eq!(h.queue.size().await.unwrap(), 1);
    delete_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn unconfigured_drain_leaves_claimed_items_for_redelivery() {
    let server = MockServer::start_async().await;
    let h = build_harness(&server, 50, false, false).await;

    write_record(&records_root(&h), "kept", "article", true);
    write_record(&records_root(&h), "kept-del", "article", true);

    // No credential is stored: the drain aborts instead of dropping the
    // backlog, for index submissions and delete resolutions alike.
    h.queue.enqueue("kept", Operation::Index).await.unwrap();
    assert!(h.indexer.drain(100, None).await.is_err());
    assert_eq!(h.queue.size().await.unwrap(), 1);

    h.queue.enqueue("kept-del", Operation::Delete).await.unwrap();
    assert!(h.indexer.drain(100, None).await.is_err());
    assert_eq!(h.queue.size().await.unwrap(), 2);
}
