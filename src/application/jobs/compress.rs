//! Image compression pipeline: fetch, re-encode, persist, record.

use std::sync::Arc;
use std::time::Instant;

use apalis::prelude::{Data, Error as ApalisError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    application::{
        cache::{ProductCache, invalidate_product},
        repos::{AppendOutcome, JobsRepo, ProductsRepo, ProductsWriteRepo, RepoError},
    },
    domain::{products::artifact_reference, types::JobType},
    infra::{
        artifacts::ArtifactStorageError,
        imaging::{ImagingError, compress_to_jpeg},
    },
};

use super::{
    context::{JobWorkerContext, job_failed},
    queue::enqueue_job,
    retry::{RetryConfig, with_retry},
};

const SOURCE: &str = "application::jobs::compress";

/// Queue envelope for one source image of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressImageJob {
    pub product_id: i64,
    pub image_url: String,
}

/// Push a compression job. Retries happen inside the handler, so the queue
/// row gets a single attempt and a failure leaves it as a dead letter.
pub async fn enqueue_compress_image_job<J: JobsRepo + ?Sized>(
    repo: &J,
    product_id: i64,
    image_url: String,
) -> Result<String, RepoError> {
    let payload = CompressImageJob {
        product_id,
        image_url,
    };
    enqueue_job(repo, JobType::CompressImage, &payload, None, 1, 0).await
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream responded with status {status}")]
    Status { status: u16 },
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("request failed: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status } => *status >= 500 || *status == 429 || *status == 408,
            Self::TooLarge { .. } => false,
            Self::Transport(_) => true,
        }
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, reference: &str, data: &[u8]) -> Result<(), ArtifactStorageError>;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching source image failed")]
    Fetch(#[source] FetchError),
    #[error("source image could not be transcoded")]
    Imaging(#[source] ImagingError),
    #[error("artifact could not be stored")]
    Store(#[source] ArtifactStorageError),
    #[error("product could not be updated")]
    Persist(#[source] RepoError),
}

impl PipelineError {
    /// Metric label of the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Imaging(err) if err.is_encode() => "encode",
            Self::Imaging(_) => "decode",
            Self::Store(_) => "store",
            Self::Persist(_) => "persist",
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_transient(),
            Self::Imaging(_) => false,
            Self::Store(err) => err.is_transient(),
            Self::Persist(err) => repo_error_is_transient(err),
        }
    }
}

fn repo_error_is_transient(err: &RepoError) -> bool {
    matches!(err, RepoError::Persistence(_) | RepoError::Timeout)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressOutcome {
    Compressed { reference: String },
    AlreadyRecorded,
    SourceRemoved,
    OwnerMissing,
}

impl CompressOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed { .. } => "compressed",
            Self::AlreadyRecorded => "already_recorded",
            Self::SourceRemoved => "source_removed",
            Self::OwnerMissing => "owner_missing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry: RetryConfig,
    /// Upper bound on `width * height` of a source image.
    pub max_pixels: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_pixels: 40_000_000,
        }
    }
}

pub struct ImagePipeline {
    reader: Arc<dyn ProductsRepo>,
    writer: Arc<dyn ProductsWriteRepo>,
    cache: Arc<dyn ProductCache>,
    fetcher: Arc<dyn ImageFetcher>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: PipelineSettings,
}

impl ImagePipeline {
    pub fn new(
        reader: Arc<dyn ProductsRepo>,
        writer: Arc<dyn ProductsWriteRepo>,
        cache: Arc<dyn ProductCache>,
        fetcher: Arc<dyn ImageFetcher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reader,
            writer,
            cache,
            fetcher,
            artifacts,
            settings,
        }
    }

    /// Process one work item. Safe to replay: the artifact name and the
    /// conditional append are both keyed on `(product_id, image_url)`.
    pub async fn run(&self, job: &CompressImageJob) -> Result<CompressOutcome, PipelineError> {
        let retry = &self.settings.retry;
        let reference = artifact_reference(job.product_id, &job.image_url);

        let product = with_retry(retry, "lookup", repo_error_is_transient, || {
            self.reader.find_product(job.product_id)
        })
        .await
        .map_err(PipelineError::Persist)?;

        let Some(product) = product else {
            return Ok(CompressOutcome::OwnerMissing);
        };
        if !product.has_source_image(&job.image_url) {
            return Ok(CompressOutcome::SourceRemoved);
        }
        if product.has_compressed_image(&reference) {
            return Ok(CompressOutcome::AlreadyRecorded);
        }

        let source = with_retry(retry, "fetch", FetchError::is_transient, || {
            self.fetcher.fetch(&job.image_url)
        })
        .await
        .map_err(PipelineError::Fetch)?;

        let max_pixels = self.settings.max_pixels;
        let compressed = tokio::task::spawn_blocking(move || compress_to_jpeg(&source, max_pixels))
            .await
            .map_err(|err| PipelineError::Imaging(ImagingError::Encode(err.to_string())))?
            .map_err(PipelineError::Imaging)?;

        with_retry(retry, "store", ArtifactStorageError::is_transient, || {
            self.artifacts.store(&reference, &compressed.bytes)
        })
        .await
        .map_err(PipelineError::Store)?;

        let appended = with_retry(retry, "persist", repo_error_is_transient, || {
            self.writer
                .append_compressed_image(job.product_id, &job.image_url, &reference)
        })
        .await
        .map_err(PipelineError::Persist)?;

        let outcome = match appended {
            AppendOutcome::Appended(_) => {
                invalidate_product(self.cache.as_ref(), job.product_id).await;
                CompressOutcome::Compressed { reference }
            }
            AppendOutcome::AlreadyRecorded => CompressOutcome::AlreadyRecorded,
            AppendOutcome::SourceRemoved => CompressOutcome::SourceRemoved,
            AppendOutcome::OwnerMissing => CompressOutcome::OwnerMissing,
        };
        Ok(outcome)
    }
}

/// Run the pipeline for one item and record its metrics and logs.
pub async fn handle_compress_image_job(
    pipeline: &ImagePipeline,
    job: &CompressImageJob,
) -> Result<CompressOutcome, PipelineError> {
    let started = Instant::now();
    let result = pipeline.run(job).await;
    metrics::histogram!("vitrine_image_job_ms").record(started.elapsed().as_secs_f64() * 1000.0);

    match &result {
        Ok(outcome) => {
            metrics::counter!("vitrine_image_jobs_total", "outcome" => outcome.as_str())
                .increment(1);
            match outcome {
                CompressOutcome::Compressed { reference } => info!(
                    target = SOURCE,
                    product_id = job.product_id,
                    image_url = %job.image_url,
                    reference = %reference,
                    "image compressed"
                ),
                other => warn!(
                    target = SOURCE,
                    product_id = job.product_id,
                    image_url = %job.image_url,
                    outcome = other.as_str(),
                    "image job skipped"
                ),
            }
        }
        Err(err) => {
            metrics::counter!("vitrine_image_jobs_total", "outcome" => "failed").increment(1);
            metrics::counter!("vitrine_image_job_failures_total", "stage" => err.stage())
                .increment(1);
            error!(
                target = SOURCE,
                product_id = job.product_id,
                image_url = %job.image_url,
                stage = err.stage(),
                transient = err.is_transient(),
                error = %err,
                cause = ?std::error::Error::source(err).map(ToString::to_string),
                "image job failed"
            );
        }
    }

    result
}

pub async fn process_compress_image_job(
    job: CompressImageJob,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    handle_compress_image_job(&ctx.pipeline, &job)
        .await
        .map(|_| ())
        .map_err(job_failed)
}
