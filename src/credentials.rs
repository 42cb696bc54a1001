//! Credential storage.
//!
//! Holds the bearer credential and target-site identity produced by the
//! OAuth exchange. The store is the single shared resource between the
//! exchange (writer) and the ingestion client (reader): the client reads
//! it on every call, so a rotated credential takes effect immediately
//! without restart. The row is replaced whole, never patched, so readers
//! see either the previous or the new credential, never a partial one.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::error::RelayError;
use crate::models::Site;

/// The stored credential plus the identity of the active target site.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub bearer_token: String,
    pub site_id: String,
    pub site_name: String,
    pub base_url: String,
    pub org_id: String,
    pub org_name: String,
    pub available_sites: Vec<Site>,
}

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the current credential, if connected.
    pub async fn load(&self) -> Result<Option<Credential>, RelayError> {
        let row = sqlx::query(
            "SELECT bearer_token, site_id, site_name, base_url, org_id, org_name, available_sites \
             FROM credentials WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let sites_json: String = row.get("available_sites");
            Credential {
                bearer_token: row.get("bearer_token"),
                site_id: row.get("site_id"),
                site_name: row.get("site_name"),
                base_url: row.get("base_url"),
                org_id: row.get("org_id"),
                org_name: row.get("org_name"),
                available_sites: serde_json::from_str(&sites_json).unwrap_or_default(),
            }
        }))
    }

    /// Replace the stored credential in one statement.
    pub async fn store(&self, credential: &Credential) -> Result<(), RelayError> {
        let sites_json =
            serde_json::to_string(&credential.available_sites).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO credentials
                (id, bearer_token, site_id, site_name, base_url, org_id, org_name, available_sites, updated_at)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                bearer_token = excluded.bearer_token,
                site_id = excluded.site_id,
                site_name = excluded.site_name,
                base_url = excluded.base_url,
                org_id = excluded.org_id,
                org_name = excluded.org_name,
                available_sites = excluded.available_sites,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.bearer_token)
        .bind(&credential.site_id)
        .bind(&credential.site_name)
        .bind(&credential.base_url)
        .bind(&credential.org_id)
        .bind(&credential.org_name)
        .bind(&sites_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete the stored credential and target identity. Idempotent.
    pub async fn clear(&self) -> Result<(), RelayError> {
        sqlx::query("DELETE FROM credentials WHERE id = 1")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Switch the active target to another of the credential's available
    /// sites. Returns false when the site id is unknown or no credential
    /// is stored.
    pub async fn select_site(&self, site_id: &str) -> Result<bool, RelayError> {
        let Some(mut credential) = self.load().await? else {
            return Ok(false);
        };

        let Some(site) = credential
            .available_sites
            .iter()
            .find(|s| s.id == site_id)
            .cloned()
        else {
            return Ok(false);
        };

        credential.site_id = site.id;
        credential.site_name = site.name;
        credential.base_url = site.base_url;
        self.store(&credential).await?;

        Ok(true)
    }
}
