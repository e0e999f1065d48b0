//! Typed error hierarchy for the compliance report crate.
//!
//! Every variant maps to a real system boundary: the Entra ID token
//! endpoint (`Auth`), the Graph REST API (`Api`, `Network`, `Parse`), the
//! local configuration (`Config`) and the CSV export (`Export`, `Io`).
//!
//! Whether an error is fatal depends on where it is raised, not on its
//! variant. A failing page fetch aborts the whole report, while the same
//! `Api` error coming out of a per-device `$batch` call is logged and
//! swallowed by [`crate::batch::enrich_device`].

use reqwest::StatusCode;

/// Unified error type for all library operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Authentication failure at the Entra ID token endpoint.
    ///
    /// Covers non-2xx token responses (the body carries the AADSTS code),
    /// transport failures reaching the endpoint, and a missing token after
    /// a refresh.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description, including HTTP status and body when available.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The Graph API returned a non-success HTTP status code.
    ///
    /// The response body is kept because Graph error payloads carry the
    /// `code`/`message` pair needed to diagnose permission problems.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by Graph.
        status: StatusCode,
        /// The raw response body text, or empty if it could not be read.
        body: String,
    },

    /// JSON deserialization failed when parsing a response body.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TCP, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid configuration file or option value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The CSV writer rejected a row or failed to flush.
    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    /// Filesystem failure while reading config or creating the report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;
