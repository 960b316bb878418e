//! API handlers organized by resource type.
//!
//! Helper functions for error conversion are defined here and shared across modules.

mod jobs;
mod media;
mod products;
mod system;

pub use jobs::*;
pub use media::*;
pub use products::*;
pub use system::*;

use axum::extract::rejection::{JsonRejection, QueryRejection};

use crate::application::pagination::PaginationError;
use crate::application::products::ProductServiceError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

use super::error::{ApiError, ErrorCode};

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::CheckViolation { constraint } => ApiError::new(
            ErrorCode::Validation,
            "Invalid product",
            Some(format!("rejected by `{constraint}`")),
        ),
        RepoError::Timeout => ApiError::new(ErrorCode::DbTimeout, "Database timeout", None),
        RepoError::Persistence(msg) => {
            ApiError::new(ErrorCode::Repo, "Persistence error", Some(msg))
        }
    }
}

pub(crate) fn domain_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::NotFound { .. } => ApiError::not_found("Product not found"),
        DomainError::Validation { .. } => ApiError::new(
            ErrorCode::Validation,
            "Invalid product",
            Some(err.to_string()),
        ),
    }
}

pub(crate) fn pagination_to_api(err: PaginationError) -> ApiError {
    ApiError::new(
        ErrorCode::InvalidPage,
        "Invalid pagination",
        Some(err.to_string()),
    )
}

pub(crate) fn product_to_api(err: ProductServiceError) -> ApiError {
    match err {
        ProductServiceError::Domain(domain) => domain_to_api(domain),
        ProductServiceError::Pagination(page) => pagination_to_api(page),
        ProductServiceError::Repo(repo) => repo_to_api(repo),
        err @ ProductServiceError::Schedule { .. } => ApiError::new(
            ErrorCode::QueueUnavailable,
            "Image processing could not be scheduled",
            Some(err.to_string()),
        ),
    }
}

/// Parse a product identifier from the path, rejecting non-numeric values.
pub(crate) fn parse_product_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| {
        ApiError::bad_request("Invalid ID", Some(format!("`{raw}` is not an integer")))
    })
}

pub(crate) fn json_rejection_to_api(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Invalid request body", Some(rejection.body_text()))
}

pub(crate) fn query_rejection_to_api(rejection: QueryRejection) -> ApiError {
    ApiError::bad_request("Invalid query", Some(rejection.body_text()))
}
