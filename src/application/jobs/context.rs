use std::error::Error as StdError;
use std::sync::Arc;

use apalis::prelude::{BoxDynError, Error as ApalisError};

use super::compress::{ImagePipeline, PipelineError};

/// State handed to every `compress_image` worker through `Data`.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub pipeline: Arc<ImagePipeline>,
}

impl JobWorkerContext {
    pub fn new(pipeline: Arc<ImagePipeline>) -> Self {
        Self { pipeline }
    }
}

/// Report a pipeline failure to apalis.
///
/// The message becomes the job row's `last_error`, so it leads with the
/// failing stage and flattens the cause chain for `GET /jobs`.
pub fn job_failed(err: PipelineError) -> ApalisError {
    let mut message = format!("{}: {err}", err.stage());
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    let boxed: BoxDynError = message.into();
    ApalisError::Failed(Arc::new(boxed))
}
