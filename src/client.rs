//! Ingestion client: the sole network boundary for the remote index.
//!
//! Every call reads the credential store, attaches the bearer header, and
//! translates any transport or non-2xx outcome into
//! [`RelayError::Delivery`]. There are no internal retries; a timed-out or
//! failed call is a single failure outcome for the caller to absorb.
//!
//! # Wait modes
//!
//! Page submission has two ingestion modes. Fire-and-forget (`wait=false`)
//! returns as soon as the remote has accepted the batch and uses a short
//! timeout. Synchronous (`wait=true`) asks the remote to finish
//! server-side processing before responding and uses a long timeout.
//! [`choose_wait_mode`] holds the default policy: wait for multi-document
//! submissions, fire-and-forget for single documents.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::error;

use crate::credentials::{Credential, CredentialStore};
use crate::error::RelayError;
use crate::models::{CrawlStatus, Document, IngestAck, Site};

/// Timeout for synchronous (`wait=true`) batch submissions; the remote may
/// hold the response while it processes the batch.
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for fire-and-forget submissions, deletes, and lookups.
const FAST_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for a full index purge.
const PURGE_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for credential validation probes.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait policy for page submissions: synchronous for batches
/// (avoids a partial race on caller-observed state), fire-and-forget for a
/// single document (never blocks the triggering write path). An explicit
/// caller choice always wins.
pub fn choose_wait_mode(batch_len: usize, caller_override: Option<bool>) -> bool {
    caller_override.unwrap_or(batch_len > 1)
}

#[derive(Clone)]
pub struct IngestionClient {
    http: reqwest::Client,
    endpoint: String,
    store: CredentialStore,
}

impl IngestionClient {
    pub fn new(endpoint: impl Into<String>, store: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    /// Whether a credential with a target site is stored.
    pub async fn is_configured(&self) -> bool {
        matches!(self.store.load().await, Ok(Some(c)) if !c.bearer_token.is_empty() && !c.site_id.is_empty())
    }

    /// Load the credential, or fail fast without a network attempt.
    async fn credential(&self) -> Result<Credential, RelayError> {
        self.store
            .load()
            .await?
            .filter(|c| !c.bearer_token.is_empty())
            .ok_or_else(|| {
                RelayError::Configuration("no credential stored; run connect first".to_string())
            })
    }

    /// Like [`credential`](Self::credential), but also requires an active
    /// target site.
    async fn credential_with_site(&self) -> Result<Credential, RelayError> {
        let credential = self.credential().await?;
        if credential.site_id.is_empty() {
            return Err(RelayError::Configuration(
                "no target site selected".to_string(),
            ));
        }
        Ok(credential)
    }

    fn delivery(context: &str, err: reqwest::Error) -> RelayError {
        error!("{}: {}", context, err);
        RelayError::Delivery(format!("{}: {}", context, err))
    }

    async fn check_status(
        context: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RelayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("{}: HTTP {} {}", context, status, body);
        Err(RelayError::Delivery(format!(
            "{}: HTTP {} {}",
            context, status, body
        )))
    }

    /// Submit documents for ingestion.
    ///
    /// `wait` falls back to [`choose_wait_mode`] when unspecified.
    pub async fn submit(
        &self,
        pages: &[Document],
        wait: Option<bool>,
    ) -> Result<IngestAck, RelayError> {
        let credential = self.credential_with_site().await?;
        let wait = choose_wait_mode(pages.len(), wait);

        let mut url = format!("{}/sites/{}/pages", self.endpoint, credential.site_id);
        if wait {
            url.push_str("?wait=true");
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "pages": pages }))
            .timeout(if wait { WAIT_TIMEOUT } else { FAST_TIMEOUT })
            .send()
            .await
            .map_err(|e| Self::delivery("page submission failed", e))?;

        let response = Self::check_status("page submission failed", response).await?;

        // Fire-and-forget responses may carry an empty body.
        Ok(response.json::<IngestAck>().await.unwrap_or_default())
    }

    /// Delete pages from the index by URL.
    pub async fn delete_by_url(&self, urls: &[String]) -> Result<bool, RelayError> {
        let credential = self.credential_with_site().await?;
        let url = format!("{}/sites/{}/pages", self.endpoint, credential.site_id);

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "urls": urls }))
            .timeout(FAST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::delivery("page deletion failed", e))?;

        Self::check_status("page deletion failed", response).await?;
        Ok(true)
    }

    /// List the sites available to the credential's organization.
    pub async fn list_sites(&self) -> Result<Vec<Site>, RelayError> {
        let credential = self.credential().await?;
        let url = format!("{}/sites", self.endpoint);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .timeout(FAST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::delivery("site listing failed", e))?;

        let response = Self::check_status("site listing failed", response).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::delivery("site listing failed", e))?;

        // The endpoint returns either {"sites": [...]} or a bare array.
        let sites = value.get("sites").cloned().unwrap_or(value);
        Ok(serde_json::from_value(sites).unwrap_or_default())
    }

    /// Trigger a remote crawl, returning the job id.
    pub async fn start_crawl(&self, max_pages: u32) -> Result<String, RelayError> {
        let credential = self.credential_with_site().await?;
        let url = format!("{}/sites/{}/crawl", self.endpoint, credential.site_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "maxPages": max_pages }))
            .timeout(FAST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::delivery("crawl trigger failed", e))?;

        let response = Self::check_status("crawl trigger failed", response).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::delivery("crawl trigger failed", e))?;

        value
            .get("jobId")
            .or_else(|| value.get("job_id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| RelayError::Delivery("crawl trigger failed: no job id in response".to_string()))
    }

    /// Fetch the status of a crawl job.
    pub async fn crawl_status(&self, job_id: &str) -> Result<CrawlStatus, RelayError> {
        let credential = self.credential_with_site().await?;
        let url = format!(
            "{}/sites/{}/crawl/{}",
            self.endpoint, credential.site_id, job_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .timeout(FAST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::delivery("crawl status failed", e))?;

        let response = Self::check_status("crawl status failed", response).await?;
        response
            .json::<CrawlStatus>()
            .await
            .map_err(|e| Self::delivery("crawl status failed", e))
    }

    /// Purge the entire remote index for the active site.
    pub async fn purge_all(&self) -> Result<bool, RelayError> {
        let credential = self.credential_with_site().await?;
        let url = format!("{}/sites/{}/purge", self.endpoint, credential.site_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .timeout(PURGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::delivery("index purge failed", e))?;

        Self::check_status("index purge failed", response).await?;
        Ok(true)
    }

    /// Probe whether the stored credential is still accepted by the remote.
    /// Returns false rather than erroring: this is a health check.
    pub async fn validate(&self) -> bool {
        let Ok(credential) = self.credential().await else {
            return false;
        };

        let url = format!("{}/sites", self.endpoint);
        match self
            .http
            .get(&url)
            .bearer_auth(&credential.bearer_token)
            .header("Accept", "application/json")
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }
}
