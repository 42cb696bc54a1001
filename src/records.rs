//! Record store and renderer collaborator seams.
//!
//! The pipeline treats entity storage and view rendering as external
//! collaborators behind the [`RecordStore`] and [`Renderer`] traits.
//! A filesystem-backed implementation is provided for the CLI and tests:
//! each record is a JSON file under a root directory, carrying its
//! pre-rendered views inline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::RecordsConfig;
use crate::models::ContentRecord;

/// Load-by-id plus the query capability the full-reindex enumeration
/// needs. Expected absences (unknown id) are `Ok(None)`, not errors.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<ContentRecord>>;

    /// Ids of all records matching the indexing policy's storage-level
    /// filters: subtype in `content_types` and, when `published_only`,
    /// in a published state.
    async fn indexable_ids(
        &self,
        content_types: &[String],
        published_only: bool,
    ) -> Result<Vec<String>>;
}

/// Produces rendered markup for a record and a named view. The pipeline
/// treats the result as opaque input text.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, record: &ContentRecord, view_mode: &str) -> Result<String>;
}

/// Record store over a directory of JSON record files.
///
/// A record with id `42` lives at `<root>/42.json`. Enumeration walks the
/// whole tree, so nested layouts work too; load falls back to a scan when
/// the flat path is missing.
pub struct JsonRecordStore {
    root: PathBuf,
}

impl JsonRecordStore {
    pub fn new(config: &RecordsConfig) -> Result<Self> {
        if !config.root.exists() {
            bail!("records root does not exist: {}", config.root.display());
        }
        Ok(Self {
            root: config.root.clone(),
        })
    }

    fn scan(&self) -> Vec<ContentRecord> {
        let mut records = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Ok(content) = std::fs::read_to_string(path) else {
                warn!("skipping unreadable record file: {}", path.display());
                continue;
            };
            match serde_json::from_str::<ContentRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed record {}: {}", path.display(), e),
            }
        }

        // Sort for deterministic ordering
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn load(&self, id: &str) -> Result<Option<ContentRecord>> {
        let flat = self.root.join(format!("{}.json", id));
        if flat.is_file() {
            let content = std::fs::read_to_string(&flat)?;
            return match serde_json::from_str::<ContentRecord>(&content) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("malformed record {}: {}", flat.display(), e);
                    Ok(None)
                }
            };
        }

        Ok(self.scan().into_iter().find(|r| r.id == id))
    }

    async fn indexable_ids(
        &self,
        content_types: &[String],
        published_only: bool,
    ) -> Result<Vec<String>> {
        Ok(self
            .scan()
            .into_iter()
            .filter(|r| content_types.iter().any(|t| t == &r.bundle))
            .filter(|r| !published_only || r.published)
            .map(|r| r.id)
            .collect())
    }
}

/// Renderer that serves a record's pre-rendered view markup.
///
/// Falls back to the `full` view when the requested view is absent, and to
/// an empty string when the record carries no views at all.
pub struct StoredViewRenderer;

#[async_trait]
impl Renderer for StoredViewRenderer {
    async fn render(&self, record: &ContentRecord, view_mode: &str) -> Result<String> {
        Ok(record
            .views
            .get(view_mode)
            .or_else(|| record.views.get("full"))
            .cloned()
            .unwrap_or_default())
    }
}
