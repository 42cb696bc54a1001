//! # Index Relay CLI (`relay`)
//!
//! The `relay` binary drives the content-indexing pipeline: connecting to
//! the remote index, queueing records, draining the queue, and managing
//! the remote site.
//!
//! ## Usage
//!
//! ```bash
//! relay --config ./relay.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay init` | Create the SQLite database and run schema migrations |
//! | `relay connect` | Authorize against the remote index via OAuth |
//! | `relay disconnect` | Forget the stored credential |
//! | `relay status` | Show connection, credential, and queue state |
//! | `relay sites` | List the sites available to the credential |
//! | `relay use-site <id>` | Switch the active target site |
//! | `relay queue all` | Queue every indexable record for a full reindex |
//! | `relay queue record <id>` | Queue one record for indexing |
//! | `relay queue delete <id>` | Queue one record for deletion |
//! | `relay queue status` | Show the queue backlog size |
//! | `relay queue clear` | Discard the queue backlog |
//! | `relay drain` | Process queued items in batches |
//! | `relay index <id>` | Index one record immediately, bypassing the queue |
//! | `relay crawl` | Trigger a remote crawl of the active site |
//! | `relay crawl-status <job>` | Show the status of a crawl job |
//! | `relay purge` | Delete every page from the remote index |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use index_relay::client::IngestionClient;
use index_relay::config::{self, Config};
use index_relay::credentials::CredentialStore;
use index_relay::db;
use index_relay::document::DocumentBuilder;
use index_relay::indexer::BatchIndexer;
use index_relay::oauth::CredentialExchange;
use index_relay::queue::{IndexQueue, CONTENT_INDEX_QUEUE};
use index_relay::records::{JsonRecordStore, RecordStore, Renderer, StoredViewRenderer};
use index_relay::server;

/// Index Relay: deliver content records to a remote AI search index.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `relay.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "relay",
    about = "Index Relay — deliver content records to a remote AI search index",
    version,
    long_about = "Index Relay converts content records into normalized documents and ships \
    them to a hosted search index over HTTPS. A durable SQLite-backed queue decouples \
    content writes from delivery, and an OAuth exchange manages the remote credential."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./relay.toml`. Database, API, indexing-policy, and
    /// OAuth settings are read from this file.
    #[arg(long, global = true, default_value = "./relay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the queue and credential
    /// tables. Safe to run multiple times.
    Init,

    /// Connect to the remote index via OAuth.
    ///
    /// Starts a loopback callback listener, prints an authorization URL to
    /// open in a browser, and stores the resulting credential once the
    /// exchange completes.
    Connect,

    /// Forget the stored credential and target site.
    Disconnect,

    /// Show connection, credential, and queue state.
    ///
    /// Includes a live probe of whether the remote still accepts the
    /// stored credential.
    Status,

    /// List the sites available to the stored credential.
    Sites,

    /// Switch the active target site.
    ///
    /// The site must be one of those advertised during connect; run
    /// `relay sites` to see them.
    UseSite {
        /// Site id to activate.
        site_id: String,
    },

    /// Manage the indexing queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Process queued items in batches.
    ///
    /// Claims items in FIFO order, builds documents, and submits them in
    /// bounded batches. A failed batch is dropped from the queue and
    /// logged; recover with `relay queue all`.
    Drain {
        /// Maximum number of items to process in this run.
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Override the configured documents-per-submission batch size.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Index one record immediately, bypassing the queue.
    Index {
        /// Record id to index.
        id: String,
    },

    /// Trigger a remote crawl of the active site.
    ///
    /// The crawler runs on the remote side; poll progress with
    /// `relay crawl-status <job>`.
    Crawl {
        /// Maximum pages the crawl may visit.
        #[arg(long, default_value_t = 100)]
        max_pages: u32,
    },

    /// Show the status of a crawl job.
    CrawlStatus {
        /// Job id returned by `relay crawl`.
        job_id: String,
    },

    /// Delete every page from the remote index for the active site.
    Purge {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

/// Queue management subcommands.
#[derive(Subcommand)]
enum QueueAction {
    /// Queue every indexable record for a full reindex.
    ///
    /// Clears the existing backlog first, then enumerates records matching
    /// the configured content types.
    All,

    /// Queue one record for indexing.
    Record {
        /// Record id to queue.
        id: String,
    },

    /// Queue one record for deletion from the remote index.
    Delete {
        /// Record id to queue.
        id: String,
    },

    /// Show the queue backlog size.
    Status,

    /// Discard the queue backlog.
    Clear,
}

fn record_store(cfg: &Config) -> Result<Arc<dyn RecordStore>> {
    let Some(records) = &cfg.records else {
        bail!("no [records] section configured; set records.root to a directory of record files");
    };
    Ok(Arc::new(JsonRecordStore::new(records)?))
}

fn build_indexer(cfg: &Config, pool: sqlx::SqlitePool) -> Result<BatchIndexer> {
    let store = record_store(cfg)?;
    let renderer: Arc<dyn Renderer> = Arc::new(StoredViewRenderer);
    let credentials = CredentialStore::new(pool.clone());
    let client = IngestionClient::new(&cfg.api.endpoint, credentials);
    let queue = IndexQueue::new(pool, CONTENT_INDEX_QUEUE);

    Ok(BatchIndexer::new(
        cfg.indexing.clone(),
        DocumentBuilder::new(),
        client,
        queue,
        store,
        renderer,
    ))
}

/// Guard for commands that talk to the remote: fail with a hint instead of
/// a delivery error when no credential is stored.
async fn require_connection(client: &IngestionClient) -> Result<()> {
    if !client.is_configured().await {
        bail!("not connected; run `relay connect` first");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("index_relay=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    db::run_migrations(&pool).await?;

    let credentials = CredentialStore::new(pool.clone());
    let client = IngestionClient::new(&cfg.api.endpoint, credentials.clone());

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}.", cfg.db.path.display());
        }

        Commands::Connect => {
            server::run_connect_flow(&cfg, pool.clone()).await?;
        }

        Commands::Disconnect => {
            let exchange =
                CredentialExchange::new(&cfg.api.endpoint, &cfg.oauth.client_id, credentials);
            exchange.disconnect().await?;
            println!("Disconnected. The stored credential has been removed.");
        }

        Commands::Status => {
            match credentials.load().await? {
                Some(credential) => {
                    println!("Connected.");
                    println!("  Organization: {} ({})", credential.org_name, credential.org_id);
                    if credential.site_id.is_empty() {
                        println!("  Active site:  none (run `relay use-site <id>`)");
                    } else {
                        println!(
                            "  Active site:  {} ({})",
                            credential.site_name, credential.site_id
                        );
                        println!("  Site URL:     {}", credential.base_url);
                    }
                    println!("  Sites:        {}", credential.available_sites.len());
                    let valid = client.validate().await;
                    println!(
                        "  Credential:   {}",
                        if valid { "valid" } else { "rejected or unreachable" }
                    );
                }
                None => println!("Not connected. Run `relay connect` to authorize."),
            }

            let queue = IndexQueue::new(pool.clone(), CONTENT_INDEX_QUEUE);
            println!("  Queue:        {} item(s) pending", queue.size().await?);
        }

        Commands::Sites => {
            require_connection(&client).await?;
            let sites = client.list_sites().await?;
            if sites.is_empty() {
                println!("No sites available to this credential.");
            } else {
                let active = credentials
                    .load()
                    .await?
                    .map(|c| c.site_id)
                    .unwrap_or_default();
                for site in sites {
                    let marker = if site.id == active { "*" } else { " " };
                    println!("{} {}  {}  {}", marker, site.id, site.name, site.base_url);
                }
            }
        }

        Commands::UseSite { site_id } => {
            if credentials.select_site(&site_id).await? {
                println!("Active site switched to {}.", site_id);
            } else {
                bail!(
                    "unknown site '{}'; run `relay sites` to list available sites",
                    site_id
                );
            }
        }

        Commands::Queue { action } => {
            let indexer = build_indexer(&cfg, pool.clone())?;
            match action {
                QueueAction::All => {
                    let queued = indexer.enqueue_all().await?;
                    println!("Queued {} record(s) for indexing.", queued);
                }
                QueueAction::Record { id } => {
                    let store = record_store(&cfg)?;
                    let Some(record) = store.load(&id).await? else {
                        return Err(index_relay::error::RelayError::NotFound(id).into());
                    };
                    if !indexer.should_index(&record) {
                        bail!("record '{}' is not indexable under the current policy", id);
                    }
                    let queue = IndexQueue::new(pool.clone(), CONTENT_INDEX_QUEUE);
                    queue
                        .enqueue(&id, index_relay::models::Operation::Index)
                        .await?;
                    println!("Queued record {} for indexing.", id);
                }
                QueueAction::Delete { id } => {
                    let queue = IndexQueue::new(pool.clone(), CONTENT_INDEX_QUEUE);
                    queue
                        .enqueue(&id, index_relay::models::Operation::Delete)
                        .await?;
                    println!("Queued record {} for deletion.", id);
                }
                QueueAction::Status => {
                    println!("{} item(s) pending.", indexer.queue_size().await?);
                }
                QueueAction::Clear => {
                    let cleared = indexer.clear_queue().await?;
                    println!("Cleared {} item(s) from the queue.", cleared);
                }
            }
        }

        Commands::Drain { limit, batch_size } => {
            require_connection(&client).await?;
            let indexer = build_indexer(&cfg, pool.clone())?;
            let processed = indexer.drain(limit, batch_size).await?;
            let remaining = indexer.queue_size().await?;
            println!(
                "Processed {} item(s); {} remaining in the queue.",
                processed, remaining
            );
        }

        Commands::Index { id } => {
            require_connection(&client).await?;
            let indexer = build_indexer(&cfg, pool.clone())?;
            if indexer.index_record(&id).await? {
                println!("Indexed record {}.", id);
            } else {
                println!("Record {} was not indexed (missing, excluded, or delivery failed).", id);
            }
        }

        Commands::Crawl { max_pages } => {
            require_connection(&client).await?;
            let job_id = client.start_crawl(max_pages).await?;
            println!("Crawl started; job id: {}", job_id);
            println!("Check progress with `relay crawl-status {}`.", job_id);
        }

        Commands::CrawlStatus { job_id } => {
            require_connection(&client).await?;
            let status = client.crawl_status(&job_id).await?;
            println!("Job {}: {}", job_id, status.status);
            println!("  discovered: {}", status.pages_discovered);
            println!("  crawled:    {}", status.pages_crawled);
            println!("  processed:  {}", status.pages_processed);
            println!("  errored:    {}", status.pages_errored);
        }

        Commands::Purge { yes } => {
            require_connection(&client).await?;
            if !yes {
                bail!("refusing to purge the remote index without --yes");
            }
            client.purge_all().await?;
            println!("Purge requested; the remote index is being cleared.");
        }
    }

    Ok(())
}
