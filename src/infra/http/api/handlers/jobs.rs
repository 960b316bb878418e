//! Jobs handlers

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use vitrine_api_types::JobListQuery;

use crate::application::jobs::list_recent_jobs;
use crate::application::repos::JobQueryFilter;
use crate::domain::types::{JobStateFilter, JobType};

use super::query_rejection_to_api;
use crate::infra::http::api::error::{ApiError, ErrorCode};
use crate::infra::http::api::state::ApiState;

/// Recent image jobs, newest first. `?state=failed` lists the dead-letter set,
/// including jobs apalis killed after their final attempt.
pub async fn list_jobs(
    State(state): State<ApiState>,
    query: Result<Query<JobListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(query_rejection_to_api)?;

    let job_state = query
        .state
        .as_deref()
        .map(|raw| {
            JobStateFilter::parse(raw).ok_or_else(|| {
                ApiError::bad_request("Invalid job state", Some(format!("unknown state `{raw}`")))
            })
        })
        .transpose()?;

    let filter = JobQueryFilter {
        state: job_state,
        job_type: Some(JobType::CompressImage),
    };

    let jobs = list_recent_jobs(state.jobs.as_ref(), &filter, query.limit)
        .await
        .map_err(|err| {
            ApiError::new(ErrorCode::Jobs, "Failed to list jobs", Some(err.to_string()))
        })?;

    Ok(Json(jobs))
}
