use thiserror::Error;
use actix_web::{error::ResponseError, HttpResponse};

use crate::services::agent::AgentError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::MissingCredentials(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::UpstreamError(other.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::ValidationError(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": msg
                }))
            }
            AppError::NotFound(msg) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": msg
                }))
            }
            AppError::UpstreamError(msg) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": msg
                }))
            }
            AppError::ServiceUnavailable(msg) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": msg
                }))
            }
        }
    }
}

/// Failures raised by the lookup services behind the agent tools.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ToolError {
    /// Connection problems, timeouts, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ToolError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ToolError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_app_error_status_codes() {
        let cases = [
            (AppError::ValidationError("bad zip".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("tool".into()), StatusCode::NOT_FOUND),
            (AppError::UpstreamError("quota".into()), StatusCode::BAD_GATEWAY),
            (AppError::ServiceUnavailable("no key".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(err.error_response().status(), status);
        }
    }

    #[test]
    fn test_agent_error_mapping() {
        let err: AppError = AgentError::MissingCredentials("GEMINI_API_KEY is not set".into()).into();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));

        let err: AppError = AgentError::MaxIterations(10).into();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[test]
    fn test_transient_statuses() {
        let status = |status| ToolError::Status { status, body: String::new() };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!ToolError::NotFound("x".into()).is_transient());
    }
}
