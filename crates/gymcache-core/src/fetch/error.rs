use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl FetchError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    /// Map a non-success HTTP status for `url` to an error.
    pub fn from_status(status: u16, url: &str, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            url.to_string()
        } else {
            format!("{}: {}", url, Self::truncate_body(body.trim()))
        };
        match status {
            404 | 410 => FetchError::NotFound(detail),
            500..=599 => FetchError::ServerError(detail),
            _ => FetchError::UnexpectedStatus {
                status,
                url: url.to_string(),
            },
        }
    }
}
