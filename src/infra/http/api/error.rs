//! JSON error body shared by every product API handler.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vitrine_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::ErrorReport;

/// Machine-readable `error.code` values. Each code implies its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Validation,
    InvalidPage,
    DbTimeout,
    Repo,
    QueueUnavailable,
    Jobs,
    Artifact,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::Validation => "validation_error",
            Self::InvalidPage => "invalid_page",
            Self::DbTimeout => "db_timeout",
            Self::Repo => "repo_error",
            Self::QueueUnavailable => "queue_unavailable",
            Self::Jobs => "jobs_error",
            Self::Artifact => "artifact_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::Validation | Self::InvalidPage => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DbTimeout | Self::QueueUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Repo | Self::Jobs | Self::Artifact => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: &'static str, hint: Option<String>) -> Self {
        Self {
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(ErrorCode::NotFound, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code.as_str();
        let diagnostic = format!(
            "{code}: {}",
            self.hint.as_deref().unwrap_or(self.message)
        );

        let mut response = (
            status,
            Json(ApiErrorBody {
                error: ApiErrorMessage {
                    code: code.to_string(),
                    message: self.message.to_string(),
                    hint: self.hint,
                },
            }),
        )
            .into_response();
        ErrorReport::from_message("infra::http::api", status, diagnostic).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_carry_their_status() {
        assert_eq!(ErrorCode::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::QueueUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::Artifact.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_attaches_report_with_hint() {
        let response = ApiError::new(
            ErrorCode::InvalidPage,
            "Invalid pagination",
            Some("limit must be between 1 and 100".to_string()),
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(
            report.messages,
            vec!["invalid_page: limit must be between 1 and 100".to_string()]
        );
    }
}
