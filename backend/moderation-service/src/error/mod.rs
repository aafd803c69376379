use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Duplicate appeal: appeal {0} is still open")]
    DuplicateAppeal(i64),

    #[error("Appeal {0} is not in a resolvable state")]
    AppealNotResolvable(i64),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Appeal not found: {0}")]
    AppealNotFound(i64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("Classifier unavailable: {0}")]
    DegradedSignal(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModerationError {
    /// Stable, machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            ModerationError::Validation(_) => "validation",
            ModerationError::DuplicateAppeal(_) => "duplicate",
            ModerationError::AppealNotResolvable(_) => "not_resolvable",
            ModerationError::Conflict(_) => "conflict",
            ModerationError::AppealNotFound(_) | ModerationError::NotFound(_) => "not_found",
            ModerationError::Database(_)
            | ModerationError::Migration(_)
            | ModerationError::Persistence(_) => "persistence",
            ModerationError::DegradedSignal(_) | ModerationError::Http(_) => "degraded_signal",
            ModerationError::ImageProcessing(_) | ModerationError::Io(_) => "image_processing",
            ModerationError::Config(_) => "config",
            ModerationError::Internal(_) => "internal",
        }
    }

    pub fn is_persistence(&self) -> bool {
        self.kind() == "persistence"
    }

    /// Message safe to show to API callers. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ModerationError::Database(_)
            | ModerationError::Migration(_)
            | ModerationError::Persistence(_)
            | ModerationError::Internal(_)
            | ModerationError::Config(_) => "Operation failed, please retry later".to_string(),
            other => other.to_string(),
        }
    }
}

/// `{success: false, error, message}` envelope returned at the API boundary.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

impl From<&ModerationError> for ErrorBody {
    fn from(err: &ModerationError) -> Self {
        Self {
            success: false,
            error: err.kind(),
            message: err.public_message(),
        }
    }
}

impl ResponseError for ModerationError {
    fn status_code(&self) -> StatusCode {
        match self {
            ModerationError::Validation(_) => StatusCode::BAD_REQUEST,
            ModerationError::DuplicateAppeal(_)
            | ModerationError::AppealNotResolvable(_)
            | ModerationError::Conflict(_) => StatusCode::CONFLICT,
            ModerationError::AppealNotFound(_) | ModerationError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ModerationError::ImageProcessing(_) | ModerationError::Io(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ModerationError::DegradedSignal(_) | ModerationError::Http(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ModerationError::Database(_)
            | ModerationError::Migration(_)
            | ModerationError::Persistence(_)
            | ModerationError::Config(_)
            | ModerationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody::from(self))
    }
}

pub type Result<T> = std::result::Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ModerationError::DuplicateAppeal(7).kind(), "duplicate");
        assert_eq!(ModerationError::AppealNotResolvable(7).kind(), "not_resolvable");
        assert_eq!(
            ModerationError::Persistence("disk full".into()).kind(),
            "persistence"
        );
        assert!(ModerationError::Database(sqlx::Error::RowNotFound).is_persistence());
    }

    #[test]
    fn test_persistence_details_are_hidden() {
        let err = ModerationError::Persistence("connection reset by peer".into());
        let body = ErrorBody::from(&err);
        assert!(!body.success);
        assert_eq!(body.error, "persistence");
        assert!(!body.message.contains("connection reset"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ModerationError::Validation("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ModerationError::DuplicateAppeal(1).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ModerationError::AppealNotFound(1).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
