//! Compressed artifact downloads

use std::io::ErrorKind;

use axum::extract::{Path, State};
use axum::http::{
    StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE},
};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::infra::artifacts::ArtifactStorageError;
use crate::infra::http::api::error::{ApiError, ErrorCode};
use crate::infra::http::api::state::ApiState;

const SOURCE: &str = "infra::http::api::media";

/// Serve a stored artifact by its reference, e.g. `products/7/<digest>.jpg`.
pub async fn serve_artifact(
    State(state): State<ApiState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    match state.artifacts.read(&path).await {
        Ok(bytes) => Ok((
            StatusCode::OK,
            [
                (CONTENT_TYPE, "image/jpeg"),
                // References embed a content digest, so an artifact never changes.
                (CACHE_CONTROL, "public, max-age=31536000, immutable"),
            ],
            bytes,
        )
            .into_response()),
        Err(ArtifactStorageError::InvalidPath) => Err(ApiError::not_found("Artifact not found")),
        Err(ArtifactStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => {
            Err(ApiError::not_found("Artifact not found"))
        }
        Err(err) => {
            error!(target = SOURCE, path = %path, error = %err, "failed to read artifact");
            Err(ApiError::new(
                ErrorCode::Artifact,
                "Failed to read artifact",
                Some(err.to_string()),
            ))
        }
    }
}
