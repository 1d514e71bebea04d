use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Errors from a single processor attempt.
///
/// These never reach callers directly; the orchestrator absorbs them and
/// falls through to the next processor.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("vlm: data is not a JPEG or PNG image, skipping")]
    NotAnImage,

    #[error("vlm: vision service request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("vlm: vision service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vlm: parse response")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("vlm: failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),
}

/// Audit sink errors
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit write failed")]
    Io(#[from] std::io::Error),

    #[error("Audit entry serialization failed")]
    Serialization(#[from] serde_json::Error),
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::JobNotFound { .. } => "job_not_found",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        // Internal details stay in the logs
        let message = match &self {
            ServiceError::Config { .. } => {
                tracing::error!(error = %self, "Request failed");
                "Document processing failed".to_string()
            }
            _ => self.to_string(),
        };

        let response = ErrorResponse {
            message,
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Format an error and its source chain on one line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
