use thiserror::Error;

#[derive(Error, Debug)]
pub enum SgxClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Token error: {0}")]
    Token(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl SgxClientError {
    /// Authentication failures trigger a token refresh before the next
    /// retry attempt.
    pub fn is_auth(&self) -> bool {
        matches!(self, SgxClientError::Api { status: 401 | 403, .. })
    }
}

pub type Result<T> = std::result::Result<T, SgxClientError>;
