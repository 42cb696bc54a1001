//! Credential validation probes against a mock remote index.

use httpmock::prelude::*;
use tempfile::TempDir;

use index_relay::client::IngestionClient;
use index_relay::config::{ApiConfig, Config, DbConfig};
use index_relay::credentials::{Credential, CredentialStore};
use index_relay::db;

async fn credential_store(dir: &TempDir) -> CredentialStore {
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
    CredentialStore::new(pool)
}

fn test_credential() -> Credential {
    Credential {
        bearer_token: "test-token".to_string(),
        site_id: "site-1".to_string(),
        site_name: "Test Site".to_string(),
        base_url: "https://example.com".to_string(),
        org_id: "org-1".to_string(),
        org_name: "Test Org".to_string(),
        available_sites: Vec::new(),
    }
}

#[tokio::test]
async fn validate_fails_fast_without_a_stored_credential() {
    let server = MockServer::start_async().await;
    let sites_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sites");
            then.status(200)
                .json_body(serde_json::json!({ "sites": [] }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let client = IngestionClient::new(server.base_url(), credential_store(&dir).await);

    // No network attempt is made while disconnected.
    assert!(!client.validate().await);
    sites_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn validate_probes_the_remote_with_a_stored_credential() {
    let server = MockServer::start_async().await;
    let sites_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sites");
            then.status(200)
                .json_body(serde_json::json!({ "sites": [] }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = credential_store(&dir).await;
    store.store(&test_credential()).await.unwrap();

    let client = IngestionClient::new(server.base_url(), store);

    assert!(client.validate().await);
    sites_mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn validate_is_false_when_the_remote_rejects_the_credential() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sites");
            then.status(401).body("invalid token");
        })
        .await;

    let dir = TempDir::new().unwrap();
    let store = credential_store(&dir).await;
    store.store(&test_credential()).await.unwrap();

    let client = IngestionClient::new(server.base_url(), store);

    assert!(!client.validate().await);
}
