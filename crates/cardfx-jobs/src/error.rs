use cardfx_pipeline::PipelineError;

use crate::job::JobId;

/// Errors surfaced by the job orchestrator.
///
/// Stage failures are also recorded as strings on the job itself; this
/// type is what [`crate::Orchestrator::start_processing`] returns
/// synchronously and what the runner formats into the job record.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The pipeline rejected the configuration or failed a stage.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A stage image could not be encoded as PNG.
    #[error("failed to encode stage image: {0}")]
    Encode(#[source] image::ImageError),

    /// The blocking task running a stage panicked or was cancelled.
    #[error("stage task did not finish: {0}")]
    StageTask(String),

    /// No job with this id is registered.
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    /// Jobs can only be started from inside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl From<tokio::task::JoinError> for JobError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::StageTask(err.to_string())
    }
}
