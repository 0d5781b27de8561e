//! Error types for the Flux client.

use thiserror::Error;

/// Result type for Flux client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Flux client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open a handle to the broker at `uri`
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    /// The broker could not report this process's rank
    #[error("failed to get broker rank: {0}")]
    Rank(#[source] std::io::Error),

    /// Attribute lookup failed
    #[error("failed to get attribute {name}: {source}")]
    Attr {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Attribute was present but not in the expected form
    #[error("attribute {name} has invalid value {value:?}")]
    InvalidAttr { name: String, value: String },

    /// RPC failed in transport or was answered with an error
    #[error("{topic}: {source}")]
    Rpc {
        topic: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Idset decoding failed
    #[error("idset error: {0}")]
    IdSet(#[from] IdSetError),
}

/// Errors decoding or querying an [`IdSet`](crate::IdSet).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdSetError {
    /// A token was not `N` or `N-M`
    #[error("invalid idset token {0:?}")]
    InvalidToken(String),

    /// A range had its bounds reversed
    #[error("invalid idset range {lo}-{hi}")]
    ReversedRange { lo: u32, hi: u32 },

    /// Opening or closing bracket without its partner
    #[error("unbalanced brackets in idset {0:?}")]
    Unbalanced(String),

    /// The set has no members
    #[error("idset is empty")]
    Empty,
}
