//! OAuth credential exchange.
//!
//! Implements the authorization-code handshake with the remote index:
//! [`CredentialExchange::initiate`] produces the authorization URL plus a
//! single-use session holding a random state token, and
//! [`CredentialExchange::complete`] validates the callback against that
//! session, swaps the code for a bearer credential, and persists it.
//!
//! The exchange is all-or-nothing. Any failure after initiation leaves the
//! credential store untouched, so a botched reconnect cannot clobber a
//! working credential.

use chrono::{DateTime, Utc};
use rand::RngCore;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

use crate::credentials::{Credential, CredentialStore};
use crate::error::AuthError;
use crate::models::Site;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// State carried between initiation and callback. Single-use: the caller
/// must discard it after one completion attempt, successful or not.
#[derive(Debug, Clone)]
pub struct ExchangeSession {
    pub state: String,
    pub created_at: DateTime<Utc>,
}

/// Query parameters delivered to the callback endpoint by the remote's
/// redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Response body of the code-for-credential token call.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    api_key: String,
    #[serde(default)]
    org_id: String,
    #[serde(default)]
    org_name: String,
    #[serde(default)]
    sites: Vec<Site>,
}

pub struct CredentialExchange {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    store: CredentialStore,
}

impl CredentialExchange {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        store: CredentialStore,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            store,
        }
    }

    /// Begin an exchange: returns the authorization URL to open in a
    /// browser and the session the callback must be validated against.
    pub fn initiate(&self, callback_url: &str) -> Result<(String, ExchangeSession), AuthError> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        let mut url = Url::parse(&format!("{}/auth/oauth/authorize", self.endpoint))
            .map_err(|e| AuthError::ExchangeFailed(format!("invalid endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", callback_url)
            .append_pair("state", &state)
            .append_pair("response_type", "code");

        let session = ExchangeSession {
            state,
            created_at: Utc::now(),
        };

        Ok((url.to_string(), session))
    }

    /// Validate the callback and exchange its code for a credential.
    ///
    /// Checks run in order: state token, remote error report, code
    /// presence, then the token call itself. The credential is stored only
    /// after the full exchange succeeds; the first advertised site becomes
    /// the active target.
    pub async fn complete(
        &self,
        session: Option<&ExchangeSession>,
        params: &CallbackParams,
        callback_url: &str,
    ) -> Result<Credential, AuthError> {
        let expected = session.map(|s| s.state.as_str());
        if expected.is_none() || params.state.as_deref() != expected {
            return Err(AuthError::InvalidState);
        }

        if let Some(error) = &params.error {
            let detail = params
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone());
            return Err(AuthError::AuthorizationDenied(detail));
        }

        let Some(code) = params.code.as_deref() else {
            return Err(AuthError::MissingCode);
        };

        let token = self.exchange_code(code, callback_url).await?;

        let active = token.sites.first().cloned().unwrap_or(Site {
            id: String::new(),
            name: String::new(),
            base_url: String::new(),
        });

        let credential = Credential {
            bearer_token: token.api_key,
            site_id: active.id,
            site_name: active.name,
            base_url: active.base_url,
            org_id: token.org_id,
            org_name: token.org_name,
            available_sites: token.sites,
        };

        self.store
            .store(&credential)
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("failed to store credential: {}", e)))?;

        info!(
            org = %credential.org_name,
            site = %credential.site_name,
            sites = credential.available_sites.len(),
            "credential exchange complete"
        );

        Ok(credential)
    }

    async fn exchange_code(
        &self,
        code: &str,
        callback_url: &str,
    ) -> Result<TokenResponse, AuthError> {
        let url = format!("{}/auth/oauth/token", self.endpoint);

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("redirect_uri", callback_url),
            ])
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!("token exchange failed: {}", e);
                AuthError::ExchangeFailed(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("token exchange failed: HTTP {} {}", status, body);
            return Err(AuthError::ExchangeFailed(format!("HTTP {}", status)));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            error!("token exchange returned an unusable body: {}", e);
            AuthError::ExchangeFailed(e.to_string())
        })
    }

    /// Forget the stored credential. Idempotent; disconnecting twice is not
    /// an error.
    pub async fn disconnect(&self) -> Result<(), AuthError> {
        self.store
            .clear()
            .await
            .map_err(|e| AuthError::ExchangeFailed(format!("failed to clear credential: {}", e)))
    }
}
