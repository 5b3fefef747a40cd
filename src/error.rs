//! Error types for the TeraSwitch provider.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by provider operations.
///
/// Remote failures keep enough detail for diagnostics: a non-success status
/// carries the response body, and poll termination by the caller is kept
/// apart from anything the API reported.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The declared configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is not configured, or its configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Declared or stored state could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request could not be completed (network, DNS, TLS).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status code.
    #[error("API returned status {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, or the envelope message when one was present.
        body: String,
    },

    /// A response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A wait was cancelled before the resource converged.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A wait ran past its deadline before the resource converged.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The operation cannot run against the current state.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is not supported for this resource type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The resource was created remotely but a later step of the create
    /// failed. `state` holds what is known about it, the id included.
    #[error("Created but not ready: {source}")]
    Incomplete {
        /// State of the created resource.
        state: Value,
        /// The failure that ended the create.
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Get the error message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Decode(msg)
            | Self::Cancelled(msg)
            | Self::DeadlineExceeded(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Transport(err) => err.to_string(),
            Self::Api { body, .. } => body.clone(),
            Self::Incomplete { source, .. } => source.message(),
        }
    }

    /// State of a resource that exists remotely even though its create
    /// failed.
    pub fn partial_state(&self) -> Option<&Value> {
        match self {
            Self::Incomplete { state, .. } => Some(state),
            _ => None,
        }
    }

    /// True when a wait ended because the caller gave up, not because the
    /// remote side failed.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled(_) | Self::DeadlineExceeded(_) => true,
            Self::Incomplete { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }

    /// True for a local not-found or an API 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Api { status: 404, .. } => true,
            Self::Incomplete { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// HTTP status of an API failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Incomplete { source, .. } => source.status(),
            _ => None,
        }
    }
}
