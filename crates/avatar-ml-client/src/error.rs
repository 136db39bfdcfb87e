//! Inference client error types.

use avatar_media::MediaError;
use thiserror::Error;

/// Result type for inference client operations.
pub type MlClientResult<T> = Result<T, MlClientError>;

#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl MlClientError {
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether the service answered with a 5xx.
    pub fn is_server_error(&self) -> bool {
        matches!(self, MlClientError::Status { status, .. } if *status >= 500)
    }

    /// Convert into the capability failure seen by the pipeline.
    pub fn into_media(self, capability: &'static str) -> MediaError {
        match self {
            MlClientError::Media(e) => e,
            other => MediaError::capability(capability, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_media_wraps_capability() {
        let err = MlClientError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert!(err.is_server_error());
        match err.into_media("stylize") {
            MediaError::CapabilityFailed { capability, message } => {
                assert_eq!(capability, "stylize");
                assert!(message.contains("503"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
