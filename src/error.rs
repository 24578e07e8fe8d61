use axum::http::StatusCode;
use thiserror::Error;

/// Reasons a webhook body cannot be turned into a [`WebhookEvent`].
///
/// [`WebhookEvent`]: crate::webhooks::events::WebhookEvent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Payload has no action field")]
    MissingAction,

    #[error("Payload is missing the pull_request or repository object")]
    MissingContext,

    #[error("Payload has no installation id")]
    MissingInstallation,

    #[error("Payload is missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    #[error("Classification error: {0}")]
    ClassificationError(#[from] ClassificationError),

    #[error("GitHub authentication error: {0}")]
    AuthError(String),

    #[error("Source control error: {0}")]
    SourceControlError(String),

    #[error("Environment error: {0}")]
    EnvironmentError(String),

    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Timed out: {0}")]
    TimeoutError(String),
}

impl PreviewError {
    /// HTTP status the webhook endpoint answers with when a request fails
    /// with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SignatureError(_) | Self::ClassificationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn missing_env(name: &str) -> Self {
        Self::ConfigError(format!("Environment variable {} is not set", name))
    }

    pub fn invalid_env(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::ConfigError(format!("Environment variable {} is invalid: {}", name, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_bad_request() {
        assert_eq!(
            PreviewError::SignatureError("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PreviewError::from(ClassificationError::MissingAction).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn processing_failures_map_to_server_error() {
        for err in [
            PreviewError::AuthError("x".into()),
            PreviewError::SourceControlError("x".into()),
            PreviewError::EnvironmentError("x".into()),
            PreviewError::FilesystemError("x".into()),
            PreviewError::TimeoutError("x".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
