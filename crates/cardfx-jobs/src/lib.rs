//! cardfx-jobs: Staged, cancellable processing jobs over the cardfx
//! pipeline.
//!
//! An [`Orchestrator`] accepts encoded images, runs each through its
//! configured stages on a tokio task, and publishes stage results as
//! PNG artifacts behind `artifact://` URLs. Callers read job state with
//! [`Orchestrator::job_status`], follow it through
//! [`Orchestrator::subscribe`] or [`Orchestrator::watch`], and cancel
//! with [`Orchestrator::abort_job`].
//!
//! ```no_run
//! # async fn demo(bytes: Vec<u8>) -> Result<(), cardfx_jobs::JobError> {
//! use cardfx_jobs::{JobState, Orchestrator};
//! use cardfx_pipeline::PipelineConfig;
//!
//! let orchestrator = Orchestrator::new();
//! let id = orchestrator.start_processing(bytes, PipelineConfig::default())?;
//! if let Some(status) = orchestrator.wait_for(id).await {
//!     assert_eq!(status.state, JobState::Completed);
//!     println!("thumbnail at {:?}", status.thumbnail_url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod error;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod registry;

pub use artifacts::{Artifact, ArtifactStore};
pub use error::JobError;
pub use events::JobEvent;
pub use job::{JobId, JobState, JobStatus, StageRecord, StageResult, StageStatus};
pub use orchestrator::Orchestrator;
pub use registry::JobRegistry;
