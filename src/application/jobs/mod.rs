mod compress;
mod context;
mod queue;
mod retry;

pub use compress::{
    ArtifactStore, CompressImageJob, CompressOutcome, FetchError, ImageFetcher, ImagePipeline,
    PipelineError, PipelineSettings, enqueue_compress_image_job, handle_compress_image_job,
    process_compress_image_job,
};
pub use context::JobWorkerContext;
pub use queue::{DEFAULT_JOB_LIST_LIMIT, MAX_JOB_LIST_LIMIT, list_recent_jobs};
pub use retry::RetryConfig;
