//! Typed errors for the access module.
//!
//! None of these escape the driver; each is logged and folded into a
//! [`Verdict`](crate::Verdict).

use flux_client::ClientError;
use thiserror::Error;

/// Errors raised while evaluating access.
#[derive(Debug, Error)]
pub enum PamFluxError {
    /// Module argument not understood
    #[error("unrecognized option: {0}")]
    UnrecognizedOption(String),

    /// Remote instance URI could not be rewritten to a local one
    #[error("failed to transform {0} into local uri")]
    UriTransform(String),

    /// Broker connection or query failed
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The application's conversation function failed
    #[error("unable to converse with app: {0}")]
    Conversation(String),
}

/// Result type alias for access module operations.
pub type Result<T> = std::result::Result<T, PamFluxError>;
