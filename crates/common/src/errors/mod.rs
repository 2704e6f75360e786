//! Error types for AgentDesk services
//!
//! Provides a single error taxonomy for the ingest -> chunk -> retrieve ->
//! generate pipeline with:
//! - Distinct error kinds for each pipeline failure mode
//! - HTTP status code mapping
//! - A JSON error envelope shared by every handler
//! - Error codes for client handling

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    InvalidUrl,

    // Resource errors
    AgentNotFound,
    KnowledgeBaseNotFound,
    CredentialMissing,
    ConversationResolutionError,

    // Rate limiting
    RateLimited,

    // External service errors
    ModelInvocationError,
    FetchError,
    DownloadError,
    UpstreamError,

    // Content errors
    ExtractionError,

    // Persistence errors
    StorageWriteError,
    DatabaseError,

    // Internal errors
    InternalError,
    ConfigurationError,
    SerializationError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    // Resource errors
    #[error("Agent not found or inactive: {id}")]
    AgentNotFound { id: String },

    #[error("Knowledge base not found: {id}")]
    KnowledgeBaseNotFound { id: String },

    #[error("LLM API key not configured for user {user_id}")]
    CredentialMissing { user_id: String },

    #[error("Conversation could not be resolved: {message}")]
    ConversationResolution { message: String },

    // Rate limiting
    #[error("Rate limit exceeded")]
    RateLimited,

    // External service errors
    #[error("Model API error{}: {message}", upstream_suffix(.status))]
    ModelInvocation { status: Option<u16>, message: String },

    #[error("Failed to fetch website: {message}")]
    Fetch { status: Option<u16>, message: String },

    #[error("Failed to download file: {message}")]
    Download { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Content errors
    #[error("Could not extract meaningful content: {message}")]
    Extraction { message: String },

    // Persistence errors
    #[error("Failed to persist {entity}: {message}")]
    StorageWrite { entity: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn upstream_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl AppError {
    /// Wrap a persistence failure for the named entity
    pub fn storage_write(entity: &str, err: impl std::fmt::Display) -> Self {
        AppError::StorageWrite {
            entity: entity.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether a retry could succeed: network failures, 429 and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AppError::ModelInvocation { status, .. } | AppError::Fetch { status, .. } => {
                match status {
                    None => true,
                    Some(code) => *code == 429 || *code >= 500,
                }
            }
            _ => false,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            AppError::AgentNotFound { .. } => ErrorCode::AgentNotFound,
            AppError::KnowledgeBaseNotFound { .. } => ErrorCode::KnowledgeBaseNotFound,
            AppError::CredentialMissing { .. } => ErrorCode::CredentialMissing,
            AppError::ConversationResolution { .. } => ErrorCode::ConversationResolutionError,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::ModelInvocation { .. } => ErrorCode::ModelInvocationError,
            AppError::Fetch { .. } => ErrorCode::FetchError,
            AppError::Download { .. } => ErrorCode::DownloadError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Extraction { .. } => ErrorCode::ExtractionError,
            AppError::StorageWrite { .. } => ErrorCode::StorageWriteError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error.
    ///
    /// Pipeline failures answer 500 regardless of kind; the precise kind
    /// travels in the `code` field of the envelope. 400 is reserved for
    /// requests rejected before any pipeline runs: unreadable or invalid
    /// bodies, and the crawl seed URL. The website ingestor reports its
    /// own bad URLs as `Fetch`.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::AgentNotFound { .. }
            | AppError::KnowledgeBaseNotFound { .. }
            | AppError::CredentialMissing { .. }
            | AppError::ConversationResolution { .. }
            | AppError::ModelInvocation { .. }
            | AppError::Fetch { .. }
            | AppError::Download { .. }
            | AppError::HttpClient(_)
            | AppError::Extraction { .. }
            | AppError::StorageWrite { .. }
            | AppError::Database(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Error envelope returned by every handler
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::ModelInvocation { status: Some(upstream), .. } => {
                Some(serde_json::json!({ "upstream_status": upstream }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            message: rejection.body_text(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::AgentNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::AgentNotFound);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "message is required".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_model_invocation_message_includes_status() {
        let err = AppError::ModelInvocation {
            status: Some(401),
            message: "Incorrect API key provided".into(),
        };
        assert_eq!(err.to_string(), "Model API error (401): Incorrect API key provided");

        let err = AppError::ModelInvocation {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Model API error: connection reset");
    }

    #[test]
    fn test_fetch_error_wording() {
        let err = AppError::Fetch {
            status: Some(404),
            message: "404 Not Found".into(),
        };
        assert_eq!(err.to_string(), "Failed to fetch website: 404 Not Found");
        assert_eq!(err.code(), ErrorCode::FetchError);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        let throttled = AppError::ModelInvocation {
            status: Some(429),
            message: "Rate limit reached".into(),
        };
        assert!(throttled.is_transient());

        let unavailable = AppError::Fetch {
            status: Some(503),
            message: "503 Service Unavailable".into(),
        };
        assert!(unavailable.is_transient());

        let unauthorized = AppError::ModelInvocation {
            status: Some(401),
            message: "Incorrect API key provided".into(),
        };
        assert!(!unauthorized.is_transient());

        assert!(!AppError::Extraction { message: "too short".into() }.is_transient());
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::CredentialMissing).unwrap();
        assert_eq!(json, "\"CREDENTIAL_MISSING\"");
    }
}
