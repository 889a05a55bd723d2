use std::time::Duration;

/// Typed errors for model provider operations.
///
/// Only `update_with_feedback` surfaces these to callers; `generate`
/// swallows internal failures and degrades to a sentinel prescription.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("model endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Endpoint { .. } => "endpoint",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout(_) => "timeout",
        }
    }
}
