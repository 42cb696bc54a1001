//! Batch indexing orchestration.
//!
//! The [`BatchIndexer`] is the consumer side of the pipeline: it drains the
//! index queue in bounded batches, builds documents, submits them through
//! the ingestion client, and reconciles queue state against the outcome.
//! It also carries the trigger surface any CLI or UI front end calls:
//! enqueue-on-save, enqueue-on-delete, full-reindex enumeration, queue
//! size, and purge.
//!
//! # Drop on failure
//!
//! A failed batch submission still commits every item in the batch. This
//! is a deliberate availability-over-completeness trade-off: indefinitely
//! retrying a poison batch would starve the queue, so the backlog keeps
//! moving and recovery is a manual full reindex by an operator. Operators
//! expecting delivery durability should know stale or missing index
//! entries after an outage are corrected with `relay queue all`.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::client::IngestionClient;
use crate::config::IndexingConfig;
use crate::document::{should_index, DocumentBuilder};
use crate::error::RelayError;
use crate::models::{ClaimedItem, ContentRecord, Document, Operation};
use crate::queue::IndexQueue;
use crate::records::{RecordStore, Renderer};

pub struct BatchIndexer {
    config: IndexingConfig,
    builder: DocumentBuilder,
    client: IngestionClient,
    queue: IndexQueue,
    store: Arc<dyn RecordStore>,
    renderer: Arc<dyn Renderer>,
}

impl BatchIndexer {
    pub fn new(
        config: IndexingConfig,
        builder: DocumentBuilder,
        client: IngestionClient,
        queue: IndexQueue,
        store: Arc<dyn RecordStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            builder,
            client,
            queue,
            store,
            renderer,
        }
    }

    pub fn should_index(&self, record: &ContentRecord) -> bool {
        should_index(&self.config, record)
    }

    /// Index a single record immediately, outside the queue.
    ///
    /// A lone document always uses fire-and-forget: the triggering write
    /// path must not block on remote processing. Returns false when the
    /// record is missing, not indexable, or delivery failed (logged).
    pub async fn index_record(&self, record_id: &str) -> Result<bool> {
        let Some(record) = self.store.load(record_id).await? else {
            info!(record = %record_id, "record not found; nothing to index");
            return Ok(false);
        };
        if !self.should_index(&record) {
            return Ok(false);
        }

        let prep_start = Instant::now();
        let rendered = self.renderer.render(&record, &self.config.view_mode).await?;
        let page = self.builder.build(&record, &rendered);
        let prep_ms = prep_start.elapsed().as_millis();

        let api_start = Instant::now();
        match self.client.submit(std::slice::from_ref(&page), Some(false)).await {
            Ok(ack) => {
                info!(
                    record = %record_id,
                    title = %record.title,
                    prep_ms,
                    api_ms = api_start.elapsed().as_millis(),
                    queued = ack.queued,
                    "indexed record"
                );
                Ok(true)
            }
            Err(e @ RelayError::Configuration(_)) => Err(e.into()),
            Err(e) => {
                error!("failed to index record {}: {}", record_id, e);
                Ok(false)
            }
        }
    }

    /// Remove a page from the remote index by URL. Delivery failures are
    /// logged and absorbed, not retried; a missing credential propagates
    /// so callers never drop work while unconfigured.
    pub async fn delete_url(&self, url: &str) -> Result<bool> {
        match self.client.delete_by_url(&[url.to_string()]).await {
            Ok(_) => {
                info!(%url, "deleted page from the index");
                Ok(true)
            }
            Err(e @ RelayError::Configuration(_)) => Err(e.into()),
            Err(e) => {
                error!("failed to delete {} from the index: {}", url, e);
                Ok(false)
            }
        }
    }

    /// Save trigger: index immediately when realtime is on, otherwise
    /// enqueue the record for the next drain.
    pub async fn record_saved(&self, record_id: &str) -> Result<()> {
        if self.config.realtime {
            self.index_record(record_id).await?;
            return Ok(());
        }

        let Some(record) = self.store.load(record_id).await? else {
            return Ok(());
        };
        if self.should_index(&record) {
            self.queue.enqueue(record_id, Operation::Index).await?;
        }
        Ok(())
    }

    /// Delete trigger. The record is still at hand here, so realtime mode
    /// can target its canonical path directly; otherwise the delete is
    /// deferred to the queue.
    pub async fn record_deleted(&self, record: &ContentRecord) -> Result<()> {
        if self.config.realtime {
            self.delete_url(&record.path).await?;
            return Ok(());
        }
        self.queue.enqueue(&record.id, Operation::Delete).await?;
        Ok(())
    }

    /// Enqueue every indexable record for a full reindex.
    ///
    /// Purges the existing backlog first to avoid duplicate work, then
    /// enumerates ids from the record store. Returns the number queued.
    pub async fn enqueue_all(&self) -> Result<usize> {
        if self.config.content_types.is_empty() {
            return Ok(0);
        }

        self.queue.purge().await?;

        let ids = self
            .store
            .indexable_ids(&self.config.content_types, self.config.exclude_unpublished)
            .await?;

        for id in &ids {
            self.queue.enqueue(id, Operation::Index).await?;
        }

        info!(count = ids.len(), "queued records for full reindex");
        Ok(ids.len())
    }

    /// Discard the queue backlog, returning the count discarded.
    pub async fn clear_queue(&self) -> Result<u64> {
        let count = self.queue.purge().await?;
        info!(count, "cleared indexing queue");
        Ok(count)
    }

    pub async fn queue_size(&self) -> Result<i64> {
        Ok(self.queue.size().await?)
    }

    /// Drain up to `limit` items from the queue in submission batches of
    /// at most `batch_size` (defaults to the configured batch size).
    ///
    /// Returns the count of committed items: deletes, skips, and
    /// submitted batch items alike. Delivery failures are absorbed here,
    /// never propagated, so a scheduled drain cannot be wedged by one bad
    /// batch.
    pub async fn drain(&self, limit: usize, batch_size: Option<usize>) -> Result<usize> {
        let batch_size = batch_size.unwrap_or(self.config.batch_size).max(1);
        let mut processed = 0usize;

        while processed < limit {
            let step = self.drain_batch(limit - processed, batch_size).await?;
            if step == 0 {
                break;
            }
            processed += step;
        }

        Ok(processed)
    }

    /// Process one submission batch: claim up to `min(budget, batch_size)`
    /// items, resolve deletes and skips individually, then submit the
    /// remaining documents in a single fire-and-forget call.
    async fn drain_batch(&self, budget: usize, batch_size: usize) -> Result<usize> {
        let mut processed = 0usize;
        let mut pages: Vec<Document> = Vec::new();
        let mut pending: Vec<ClaimedItem> = Vec::new();

        while processed + pending.len() < budget && pages.len() < batch_size {
            let Some(item) = self.queue.claim(1).await?.into_iter().next() else {
                break;
            };

            match item.operation {
                Operation::Delete => {
                    // A failed remote delete still commits; an unconfigured
                    // pipeline aborts first, leaving the item claimed for
                    // lease redelivery like the index arm does.
                    match self.store.load(&item.record_id).await? {
                        Some(record) => {
                            self.delete_url(&record.path).await?;
                        }
                        None => {
                            info!(record = %item.record_id, "record gone; no remote delete target");
                        }
                    }
                    self.queue.commit(&item).await?;
                    processed += 1;
                }
                Operation::Index => match self.store.load(&item.record_id).await? {
                    Some(record) if self.should_index(&record) => {
                        let rendered =
                            self.renderer.render(&record, &self.config.view_mode).await?;
                        pages.push(self.builder.build(&record, &rendered));
                        pending.push(item);
                    }
                    _ => {
                        info!(record = %item.record_id, "skipping record: not found or not indexable");
                        self.queue.commit(&item).await?;
                        processed += 1;
                    }
                },
            }
        }

        if !pages.is_empty() {
            info!(count = pages.len(), "submitting batch to the index");

            // Fire-and-forget regardless of batch size: batching bounds the
            // request count; synchronous confirmation at scale risks
            // caller-side timeouts.
            match self.client.submit(&pages, Some(false)).await {
                Ok(_) => {
                    info!(count = pages.len(), "batch submitted for async processing");
                }
                Err(e @ RelayError::Configuration(_)) => {
                    // Not a delivery outcome: the pipeline is unconfigured.
                    // Leave the claimed items for redelivery.
                    return Err(e.into());
                }
                Err(e) => {
                    error!("batch submission failed: {}", e);
                    warn!(
                        count = pending.len(),
                        "removing failed batch items from the queue; re-queue them with a full reindex"
                    );
                }
            }

            for item in &pending {
                self.queue.commit(item).await?;
                processed += 1;
            }
        }

        Ok(processed)
    }
}
