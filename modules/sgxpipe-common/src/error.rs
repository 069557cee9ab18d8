use thiserror::Error;

/// Company-level failure classification for the pipeline runner.
///
/// Cancellation is its own variant because it maps to a distinct queue
/// status (`cancelled`, not `error`).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Client error: {0}")]
    Client(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),

    #[error("Cancelled by operator")]
    Cancelled,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
