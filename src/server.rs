//! Short-lived callback listener for `relay connect`.
//!
//! Binds a loopback HTTP server, prints the authorization URL for the
//! operator to open, waits for exactly one OAuth callback, completes the
//! exchange, and exits. The session is taken out of shared state on first
//! use, so a replayed callback fails state validation instead of running a
//! second exchange.

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{AuthError, RelayError};
use crate::oauth::{CallbackParams, CredentialExchange, ExchangeSession};

struct ConnectState {
    exchange: CredentialExchange,
    session: Mutex<Option<ExchangeSession>>,
    callback_url: String,
    done: mpsc::Sender<Result<Credential, AuthError>>,
}

/// Run the interactive connect flow to completion: one callback, one
/// exchange, then shutdown.
pub async fn run_connect_flow(config: &Config, pool: SqlitePool) -> Result<()> {
    let store = CredentialStore::new(pool);
    let exchange = CredentialExchange::new(&config.api.endpoint, &config.oauth.client_id, store);

    let callback_url = format!("http://{}/oauth/callback", config.oauth.callback_bind);
    let (auth_url, session) = exchange.initiate(&callback_url)?;

    let (done_tx, mut done_rx) = mpsc::channel::<Result<Credential, AuthError>>(1);

    let state = Arc::new(ConnectState {
        exchange,
        session: Mutex::new(Some(session)),
        callback_url,
        done: done_tx,
    });

    let app = Router::new()
        .route("/oauth/callback", get(handle_callback))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.oauth.callback_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.oauth.callback_bind))?;
    info!(addr = %config.oauth.callback_bind, "callback listener ready");

    println!("Open this URL in your browser to authorize:");
    println!();
    println!("  {}", auth_url);
    println!();
    println!("Waiting for the authorization callback...");

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let outcome = done_rx
        .recv()
        .await
        .context("callback listener closed before completing the exchange")?;

    // Let the browser response flush before tearing the listener down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.abort();

    match outcome {
        Ok(credential) => {
            println!(
                "Connected to {} ({} site{} available).",
                credential.org_name,
                credential.available_sites.len(),
                if credential.available_sites.len() == 1 { "" } else { "s" }
            );
            if !credential.site_name.is_empty() {
                println!("Active site: {} ({})", credential.site_name, credential.site_id);
            }
            Ok(())
        }
        Err(e) => Err(RelayError::from(e).into()),
    }
}

async fn handle_callback(
    State(state): State<Arc<ConnectState>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    // take() enforces single use: a second callback sees no session.
    let session = state.session.lock().expect("session lock").take();

    let outcome = state
        .exchange
        .complete(session.as_ref(), &params, &state.callback_url)
        .await;

    let page = match &outcome {
        Ok(_) => {
            "<h1>Connected</h1><p>Authorization complete. You can close this tab.</p>".to_string()
        }
        Err(e) => format!("<h1>Connection failed</h1><p>{}</p>", e),
    };

    let _ = state.done.send(outcome).await;
    Html(page)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
