use time::OffsetDateTime;

use crate::{
    application::repos::{JobQueryFilter, JobsRepo, NewJobRecord, RepoError},
    domain::{entities::JobRecord, types::JobType},
};

pub const DEFAULT_JOB_LIST_LIMIT: u32 = 50;
pub const MAX_JOB_LIST_LIMIT: u32 = 200;

/// Enqueue a job with the provided payload, returning the assigned ULID.
pub async fn enqueue_job<J, P>(
    repo: &J,
    job_type: JobType,
    payload: &P,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
    priority: i32,
) -> Result<String, RepoError>
where
    J: JobsRepo + ?Sized,
    P: serde::Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    let record = NewJobRecord {
        job_type,
        payload,
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
        priority,
    };

    repo.enqueue_job(record).await
}

/// Most recent jobs matching `filter`; `limit` is clamped to the listing maximum.
pub async fn list_recent_jobs<J>(
    repo: &J,
    filter: &JobQueryFilter,
    limit: Option<u32>,
) -> Result<Vec<JobRecord>, RepoError>
where
    J: JobsRepo + ?Sized,
{
    let limit = limit
        .unwrap_or(DEFAULT_JOB_LIST_LIMIT)
        .clamp(1, MAX_JOB_LIST_LIMIT);
    repo.list_jobs(filter, limit).await
}
