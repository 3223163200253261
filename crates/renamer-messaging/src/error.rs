//! Messaging transport error types.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by a messaging transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform asked us to slow down. The message carries its wait hint.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Edit rejected because the text is unchanged.
    #[error("Message is not modified")]
    MessageNotModified,

    #[error("API error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn api(code: u16, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
        }
    }

    /// Map an API failure to the matching variant.
    pub fn from_api_error(code: u16, description: impl Into<String>, retry_after: Option<u64>) -> Self {
        let description = description.into();
        if code == 429 {
            return match retry_after {
                Some(secs) => Self::RateLimited(format!("Too Many Requests: retry after {}", secs)),
                None => Self::RateLimited(description),
            };
        }
        if code == 400 && description.contains("message is not modified") {
            return Self::MessageNotModified;
        }
        Self::Api { code, description }
    }

    /// The distinguished rate-limit condition.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited(_))
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, TransportError::MessageNotModified)
    }

    /// Message was already gone when we tried to touch it.
    pub fn is_message_missing(&self) -> bool {
        matches!(
            self,
            TransportError::Api { code: 400, description }
            if description.contains("message to delete not found")
                || description.contains("message to edit not found")
        )
    }
}
