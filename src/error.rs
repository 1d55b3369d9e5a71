//! Error types for traced HTTP calls.
//!
//! Transport-level failures are never surfaced as bare errors: they travel
//! inside a [`TransportFailure`], which pairs the classified error with the
//! complete archive [`Entry`](crate::har::Entry) recorded for the attempt.
//! Callers always get a replayable record, whatever happened on the wire.

use crate::har::Entry;

/// The main error type for traced HTTP calls.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed,
    /// timeout, etc.). Classified into an HTTP-like status by
    /// [`status::classify`](crate::status::classify).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request used a method the dispatcher does not support.
    ///
    /// Only GET, HEAD, POST, PUT and DELETE are dispatched.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Invalid client or request configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A transport-level failure, paired with the archive entry recorded for it.
///
/// The `Display` form leads with the classified numeric status, so the error
/// message itself identifies the synthesized outcome (e.g. `503 Connection
/// refused: ...`). The same text is recorded as the body of the entry's
/// synthesized `text/plain` response.
#[derive(thiserror::Error, Debug)]
#[error("{status} {status_text}: {source}")]
pub struct TransportFailure {
    /// The classified HTTP-like status.
    pub status: u16,
    /// The classified reason text.
    pub status_text: String,
    /// The fully populated archive entry for the failed exchange.
    pub entry: Entry,
    /// The underlying error.
    #[source]
    pub source: Error,
}

impl TransportFailure {
    /// Consumes the failure, returning the recorded archive entry.
    pub fn into_entry(self) -> Entry {
        self.entry
    }
}

/// A specialized `Result` type for traced HTTP calls.
pub type Result<T> = std::result::Result<T, Error>;
