//! Core data models used throughout Index Relay.
//!
//! These types represent the documents, queue items, and remote-API payloads
//! that flow through the indexing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalized document shipped to the remote index.
///
/// `url` is the document's natural key on the remote side: deletes target
/// the same value that was used at index time, so it must be a stable
/// canonical path, not an internal identifier.
///
/// Documents are immutable value objects, built fresh per indexing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Always `"html"` for this pipeline.
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    /// Lowercase tag set; omitted from the wire payload when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Queue operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Index,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Delete => "delete",
        }
    }

    /// Unknown values default to `Index`, matching the queue's historic
    /// behavior for items enqueued without an explicit operation.
    pub fn parse(s: &str) -> Operation {
        match s {
            "delete" => Operation::Delete,
            _ => Operation::Index,
        }
    }
}

/// A queue item claimed by a consumer. The `id` is the queue row and is
/// required to commit the item.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub id: i64,
    pub record_id: String,
    pub operation: Operation,
}

/// A reference from a content record to another entity (taxonomy term,
/// author, media, ...). The builder scans these for taxonomy-like targets
/// when collecting tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub target_type: String,
    pub name: String,
}

/// A mutable content record loaded from the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    /// Content subtype (the record's bundle).
    pub bundle: String,
    pub title: String,
    /// Canonical path, stable across the record's lifetime.
    pub path: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub references: Vec<EntityRef>,
    /// Pre-rendered markup per named view. The renderer collaborator picks
    /// the configured view from here.
    #[serde(default)]
    pub views: HashMap<String, String>,
}

/// A target site on the remote index, as returned by `GET /sites` and the
/// token exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub base_url: String,
}

/// Acknowledgement from a page submission. The remote returns an empty body
/// for fire-and-forget submissions, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestAck {
    #[serde(default)]
    pub queued: bool,
}

/// Status record for a remote crawl job.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pages_discovered: u64,
    #[serde(default)]
    pub pages_crawled: u64,
    #[serde(default)]
    pub pages_processed: u64,
    #[serde(default)]
    pub pages_errored: u64,
}
