//! Error types for Snyk API operations.

use std::sync::Arc;

use thiserror::Error;

use crate::models::EntityKind;

/// Errors that can occur during Snyk API operations.
#[derive(Debug, Error)]
pub enum SnykError {
    /// No API token was supplied.
    #[error("Snyk credential required: {0}")]
    Unauthenticated(String),

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The retry budget was consumed without a successful response.
    #[error("Request failed after {attempts} attempts (last status: {})", fmt_status(*.last_status))]
    TransportExhausted {
        attempts: u32,
        last_status: Option<u16>,
        last_payload: Option<serde_json::Value>,
    },

    /// The credential was rejected (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The credential lacks access to the resource (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The resource does not exist (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was rejected as malformed (400, 422).
    #[error("Invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Any other non-success status.
    #[error("Snyk API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Root discovery found more than one candidate.
    #[error("Token is scoped to {count} groups ({}); specify a group id", names.join(", "))]
    AmbiguousScope { count: usize, names: Vec<String> },

    /// Pagination metadata was malformed mid-sequence.
    #[error("Pagination failed for {path} on page {page}: {reason}")]
    PaginationError {
        path: String,
        page: u32,
        reason: String,
    },

    /// A lazy relation could not be resolved.
    #[error("Failed to resolve {relation} of {owner}: {source}")]
    RelationResolutionFailed {
        owner: String,
        relation: &'static str,
        #[source]
        source: Arc<SnykError>,
    },

    /// A resource payload did not have the shape an entity requires.
    #[error("Invalid {kind} resource '{id}': {reason}")]
    InvalidResource {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    /// A package URL could not be parsed.
    #[error("Invalid package URL '{0}': expected format like 'pkg:npm/lodash@4.17.21'")]
    InvalidPurl(String),

    /// A background fetch task panicked or was cancelled.
    #[error("Background fetch failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The client's worker pool was shut down.
    #[error("Snyk client has been closed")]
    ClientClosed,

    /// Every [`Session`](crate::Session) owning the entity cache was dropped.
    #[error("Session has been dropped; keep a Session alive while using its entities")]
    SessionDropped,

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("Failed to parse response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// Config file parsing error.
    #[error("Failed to parse config file: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnykError {
    /// Returns true if this error, or the error a relation failure wraps,
    /// is a 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            SnykError::NotFound(_) => true,
            SnykError::RelationResolutionFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The HTTP status this error was derived from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SnykError::Unauthorized(_) => Some(401),
            SnykError::Forbidden(_) => Some(403),
            SnykError::NotFound(_) => Some(404),
            SnykError::InvalidRequest { status, .. } | SnykError::Api { status, .. } => {
                Some(*status)
            }
            SnykError::TransportExhausted { last_status, .. } => *last_status,
            SnykError::RelationResolutionFailed { source, .. } => source.status(),
            _ => None,
        }
    }
}

fn fmt_status(status: Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// Result type alias for Snyk operations.
pub type Result<T> = core::result::Result<T, SnykError>;
