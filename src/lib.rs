//! Index Relay: a content-indexing pipeline for a remote AI search index.
//!
//! The pipeline converts content records into normalized documents and
//! delivers them over HTTPS to a hosted search index, with a durable
//! at-least-once queue between content writes and delivery. Connecting is
//! an OAuth authorization-code exchange that stores a bearer credential
//! and a target site identity locally.
//!
//! Module map:
//!
//! - [`config`]: TOML configuration with serde defaults and validation
//! - [`db`]: SQLite pool and schema for the queue and credential store
//! - [`models`]: documents, records, queue items, and wire payloads
//! - [`document`]: sanitization, tag collection, and alteration hooks
//! - [`records`]: record store and renderer collaborator traits
//! - [`queue`]: durable claim/commit queue
//! - [`credentials`]: single-row credential storage
//! - [`client`]: the HTTP boundary to the remote index
//! - [`indexer`]: batch drain orchestration and trigger surface
//! - [`oauth`]: the credential exchange state machine
//! - [`server`]: the short-lived callback listener for `relay connect`
//! - [`error`]: the pipeline's error taxonomy

pub mod client;
pub mod config;
pub mod credentials;
pub mod db;
pub mod document;
pub mod error;
pub mod indexer;
pub mod models;
pub mod oauth;
pub mod queue;
pub mod records;
pub mod server;
