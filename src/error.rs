//! Error taxonomy for the indexing pipeline.
//!
//! Callers never see transport-level error types: the ingestion client
//! folds every network failure into [`RelayError::Delivery`], and the
//! credential exchange reports its distinct user-facing reasons via
//! [`AuthError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing credential or target identity. Raised before any network
    /// call is attempted.
    #[error("not connected: {0}")]
    Configuration(String),

    /// Credential exchange failure, with the reason preserved for the UI.
    #[error(transparent)]
    Authorization(#[from] AuthError),

    /// Transport failure or non-2xx outcome from the remote index.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A claimed queue item whose source record vanished. Treated as a
    /// skip by the batch indexer, not a failure.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Underlying queue or credential storage failure.
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Terminal outcomes of a credential exchange attempt. Each maps to a
/// distinct operator-facing message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The callback's state token did not match the session's stored
    /// token, likely CSRF or an expired session.
    #[error("invalid authorization state; please try connecting again")]
    InvalidState,

    /// The remote reported an authorization error.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The callback carried no authorization code.
    #[error("no authorization code received")]
    MissingCode,

    /// The code-for-credential exchange call failed.
    #[error("credential exchange failed: {0}")]
    ExchangeFailed(String),
}
