//! Durable index queue with claim/commit semantics.
//!
//! A process-crash-tolerant FIFO keyed by queue name. Items are claimed
//! atomically (two concurrent drains never receive the same item), become
//! invisible to other claimants while claimed, and are redelivered if a
//! claim's lease expires without a commit. Delivery is at-least-once,
//! never silent loss. The queue itself never retries; retry and drop
//! policy belong to the batch indexer.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::RelayError;
use crate::models::{ClaimedItem, Operation};

/// Queue name used by the content-indexing pipeline.
pub const CONTENT_INDEX_QUEUE: &str = "content_index";

/// Claims older than this are considered abandoned (consumer crashed
/// mid-drain) and become claimable again.
pub const CLAIM_LEASE_SECS: i64 = 300;

#[derive(Clone)]
pub struct IndexQueue {
    pool: SqlitePool,
    name: String,
}

impl IndexQueue {
    pub fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    /// Append an item. Always succeeds; duplicates for the same record are
    /// permitted (indexing is idempotent per URL on the remote side).
    pub async fn enqueue(
        &self,
        record_id: &str,
        operation: Operation,
    ) -> Result<(), RelayError> {
        sqlx::query(
            "INSERT INTO queue_items (queue, record_id, operation, enqueued_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.name)
        .bind(record_id)
        .bind(operation.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Claim up to `max` items in FIFO order.
    ///
    /// The claim is a single UPDATE, so concurrent claimers never receive
    /// overlapping items. Claimed items stay invisible until committed or
    /// their lease expires.
    pub async fn claim(&self, max: usize) -> Result<Vec<ClaimedItem>, RelayError> {
        let now = Utc::now().timestamp();
        let expiry = now - CLAIM_LEASE_SECS;

        let rows = sqlx::query(
            r#"
            UPDATE queue_items
            SET claimed_at = ?
            WHERE id IN (
                SELECT id FROM queue_items
                WHERE queue = ? AND (claimed_at IS NULL OR claimed_at < ?)
                ORDER BY id
                LIMIT ?
            )
            RETURNING id, record_id, operation
            "#,
        )
        .bind(now)
        .bind(&self.name)
        .bind(expiry)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| ClaimedItem {
                id: row.get("id"),
                record_id: row.get("record_id"),
                operation: Operation::parse(row.get("operation")),
            })
            .collect::<Vec<_>>();

        if !items.is_empty() {
            debug!(queue = %self.name, count = items.len(), "claimed queue items");
        }

        Ok(items)
    }

    /// Permanently remove a claimed item.
    pub async fn commit(&self, item: &ClaimedItem) -> Result<(), RelayError> {
        sqlx::query("DELETE FROM queue_items WHERE id = ?")
            .bind(item.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Approximate count of unclaimed plus claimed-but-uncommitted items.
    pub async fn size(&self) -> Result<i64, RelayError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE queue = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Atomically discard all items, returning the count discarded.
    pub async fn purge(&self) -> Result<u64, RelayError> {
        let result = sqlx::query("DELETE FROM queue_items WHERE queue = ?")
            .bind(&self.name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
