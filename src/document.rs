//! Document construction.
//!
//! Turns one content record plus its rendered markup into a normalized
//! [`Document`]: sanitize the markup, collect taxonomy tags, then apply
//! any registered alteration hooks. Building is pure given its inputs:
//! no network, no queue access.

use chrono::Utc;
use regex::Regex;

use crate::config::IndexingConfig;
use crate::models::{ContentRecord, Document};

/// Post-build extension point. Alterers may mutate the document in place
/// (add tags, append content) before it is handed to the ingestion client.
/// Alterers run exactly once per document, after sanitization, in
/// registration order; later alterers observe earlier ones' effects.
pub trait DocumentAlterer: Send + Sync {
    fn alter(&self, document: &mut Document, record: &ContentRecord);
}

pub struct DocumentBuilder {
    sanitizer: Sanitizer,
    alterers: Vec<Box<dyn DocumentAlterer>>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            sanitizer: Sanitizer::new(),
            alterers: Vec::new(),
        }
    }

    /// Register an alteration hook. Hooks run in registration order.
    pub fn register_alterer(&mut self, alterer: Box<dyn DocumentAlterer>) {
        self.alterers.push(alterer);
    }

    /// Build a document from a record and its already-rendered markup.
    pub fn build(&self, record: &ContentRecord, rendered: &str) -> Document {
        let content = self.sanitizer.sanitize(rendered);

        // Taxonomy references become lowercase tags; the record's subtype
        // is always appended as a synthetic tag for filtering.
        let mut tags: Vec<String> = record
            .references
            .iter()
            .filter(|r| r.target_type == "taxonomy_term")
            .map(|r| r.name.to_lowercase())
            .collect();
        tags.push(format!("type:{}", record.bundle));
        dedup_preserving_order(&mut tags);

        let mut document = Document {
            url: record.path.clone(),
            title: record.title.clone(),
            content,
            content_type: "html".to_string(),
            fetched_at: Utc::now(),
            tags,
        };

        for alterer in &self.alterers {
            alterer.alter(&mut document, record);
        }

        document
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a record is eligible for indexing under the given policy:
/// pipeline enabled, subtype allow-listed, and (when configured) in a
/// published state.
pub fn should_index(config: &IndexingConfig, record: &ContentRecord) -> bool {
    if !config.enabled {
        return false;
    }

    if !config.content_types.iter().any(|t| t == &record.bundle) {
        return false;
    }

    if config.exclude_unpublished && !record.published {
        return false;
    }

    true
}

/// Best-effort markup cleanup for indexing.
///
/// Strips script blocks, style blocks, comments, and `<nav>` chrome, then
/// collapses whitespace runs. Deterministic and lossy: bounded pattern
/// matching, not a full parser, so malformed markup degrades gracefully
/// instead of erroring.
struct Sanitizer {
    scripts: Regex,
    styles: Regex,
    comments: Regex,
    nav: Regex,
    whitespace: Regex,
}

impl Sanitizer {
    fn new() -> Self {
        // Fixed patterns; compilation cannot fail at runtime.
        let compile = |pattern: &str| Regex::new(pattern).expect("static sanitizer pattern");

        Self {
            scripts: compile(r"(?is)<script\b[^>]*>.*?</script>"),
            styles: compile(r"(?is)<style\b[^>]*>.*?</style>"),
            comments: compile(r"(?s)<!--.*?-->"),
            nav: compile(r"(?is)<nav\b[^>]*>.*?</nav>"),
            whitespace: compile(r"\s+"),
        }
    }

    fn sanitize(&self, html: &str) -> String {
        let html = self.scripts.replace_all(html, "");
        let html = self.styles.replace_all(&html, "");
        let html = self.comments.replace_all(&html, "");
        let html = self.nav.replace_all(&html, "");
        // Forms are kept: users may search for form-related content.
        let html = self.whitespace.replace_all(&html, " ");
        html.trim().to_string()
    }
}

fn dedup_preserving_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}
