//! The processing orchestrator: starts jobs, runs their stages, reports
//! status, and cancels cooperatively.
//!
//! Each job runs on its own tokio task. Stages within a job run strictly
//! in order; the pixel work of a stage runs on the blocking pool via
//! [`tokio::task::spawn_blocking`] and the runner yields between stages.
//!
//! Cancellation never interrupts a stage mid-computation. [`Orchestrator::abort_job`]
//! marks the job aborted and revokes its artifacts; the runner checks
//! before scheduling each stage and throws away the output of a stage
//! that finishes after the abort.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cardfx_pipeline::{PipelineConfig, PipelineState, StageKind, StageOutput, run_stage};
use tokio::sync::{broadcast, watch};

use crate::artifacts::{Artifact, ArtifactStore, EncodedImage};
use crate::error::JobError;
use crate::events::JobEvent;
use crate::job::{JobId, JobStatus, StageResult};
use crate::registry::JobRegistry;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A stage's output, PNG-encoded off the async runtime.
enum EncodedOutput {
    Preview {
        preview: EncodedImage,
        placeholder: EncodedImage,
    },
    Processed {
        image: EncodedImage,
        report: cardfx_pipeline::ProcessReport,
    },
    Thumbnail {
        thumbnail: EncodedImage,
    },
}

impl EncodedOutput {
    fn encode(output: &StageOutput) -> Result<Self, JobError> {
        Ok(match output {
            StageOutput::Preview {
                preview,
                placeholder,
            } => Self::Preview {
                preview: EncodedImage::encode("preview", preview)?,
                placeholder: EncodedImage::encode("placeholder", placeholder)?,
            },
            StageOutput::Processed { image, report } => Self::Processed {
                image: EncodedImage::encode("processed", image)?,
                report: report.clone(),
            },
            StageOutput::Thumbnail { thumbnail } => Self::Thumbnail {
                thumbnail: EncodedImage::encode("thumbnail", thumbnail)?,
            },
        })
    }
}

/// Runs processing jobs and tracks their state.
///
/// Cloning is cheap; clones share the same registry, artifacts and
/// event channel.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    artifacts: Arc<ArtifactStore>,
    events: broadcast::Sender<JobEvent>,
}

impl Orchestrator {
    /// An orchestrator with no jobs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// An orchestrator whose event channel buffers `capacity` events per
    /// subscriber before the slowest one starts lagging.
    #[must_use]
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(JobRegistry::new()),
            artifacts: Arc::new(ArtifactStore::new()),
            events,
        }
    }

    /// The artifact store holding every job's stage images.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Start processing `image_bytes` and return immediately.
    ///
    /// The job is registered with every configured stage pending before
    /// this returns, so [`job_status`](Self::job_status) sees it at once.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Pipeline`] if `config` fails validation and
    /// [`JobError::NoRuntime`] outside a tokio runtime. Decode and stage
    /// failures are not returned here; they fail the job.
    pub fn start_processing(
        &self,
        image_bytes: Vec<u8>,
        config: PipelineConfig,
    ) -> Result<JobId, JobError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()?;
        let id = self.registry.insert_and_notify(&config.stages, |status| {
            self.emit(JobEvent::Started { id: status.id });
        });
        log::debug!("{id}: registered with {} stage(s)", config.stages.len());
        runtime.spawn(self.clone().run_job(id, image_bytes, Arc::new(config)));
        Ok(id)
    }

    /// Start one job per input, yielding between starts.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Pipeline`] if `config` fails validation, in
    /// which case no job is started.
    pub async fn start_batch(
        &self,
        inputs: impl IntoIterator<Item = Vec<u8>>,
        config: &PipelineConfig,
    ) -> Result<Vec<JobId>, JobError> {
        config.validate()?;
        let mut ids = Vec::new();
        for bytes in inputs {
            ids.push(self.start_processing(bytes, config.clone())?);
            tokio::task::yield_now().await;
        }
        Ok(ids)
    }

    /// Snapshot of a job, or `None` if it is unknown or was released.
    #[must_use]
    pub fn job_status(&self, id: JobId) -> Option<JobStatus> {
        self.registry.get(id)
    }

    /// Ids of every registered job.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobId> {
        self.registry.ids()
    }

    /// Receive every job event from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Follow the latest snapshot of one job.
    #[must_use]
    pub fn watch(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.registry.watch(id)
    }

    /// Wait until a job reaches a terminal state.
    ///
    /// Returns `None` if the job is unknown or is released before it
    /// finishes.
    pub async fn wait_for(&self, id: JobId) -> Option<JobStatus> {
        let mut rx = self.registry.watch(id)?;
        let status = rx.wait_for(|status| status.state.is_terminal()).await.ok()?.clone();
        Some(status)
    }

    /// Cancel a job cooperatively.
    ///
    /// No further stages are scheduled, the output of a stage already in
    /// flight is discarded when it finishes, and artifacts the job has
    /// already produced are revoked. Returns `false` if the job is
    /// unknown or already finished.
    pub fn abort_job(&self, id: JobId) -> bool {
        if self
            .transition(id, JobStatus::abort, |_| JobEvent::Aborted { id })
            .is_none()
        {
            return false;
        }
        let revoked = self.artifacts.revoke_job(id);
        log::warn!("{id}: aborted, revoked {revoked} artifact(s)");
        true
    }

    /// Forget a job and revoke its artifacts.
    ///
    /// A runner still working on the job stops at its next check.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::UnknownJob`] if no such job is registered.
    pub fn release_job(&self, id: JobId) -> Result<JobStatus, JobError> {
        let status = self.registry.remove(id).ok_or(JobError::UnknownJob(id))?;
        self.artifacts.revoke_job(id);
        log::debug!("{id}: released");
        Ok(status)
    }

    /// Fetch an artifact by URL.
    #[must_use]
    pub fn artifact(&self, url: &str) -> Option<Artifact> {
        self.artifacts.get(url)
    }

    /// Revoke one artifact URL. Returns whether it was live.
    pub fn revoke_artifact(&self, url: &str) -> bool {
        self.artifacts.revoke(url)
    }

    /// Drop every job and artifact.
    pub fn reset(&self) {
        self.registry.clear();
        self.artifacts.clear();
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        self.events.send(event).ok();
    }

    /// Apply a transition and, if it took effect, broadcast the event
    /// built from the new snapshot while the registry is still locked.
    fn transition(
        &self,
        id: JobId,
        change: impl FnOnce(&mut JobStatus) -> bool,
        event: impl FnOnce(&JobStatus) -> JobEvent,
    ) -> Option<JobStatus> {
        self.registry
            .update_and_notify(id, change, |status| self.emit(event(status)))
    }

    /// Whether the runner for `id` should stop: the job was aborted,
    /// released or otherwise finished.
    fn should_stop(&self, id: JobId) -> bool {
        self.registry
            .get(id)
            .is_none_or(|status| status.state.is_terminal())
    }

    async fn run_job(self, id: JobId, image_bytes: Vec<u8>, config: Arc<PipelineConfig>) {
        let mut state = PipelineState::new(image_bytes);

        for (index, kind) in config.stages.iter().copied().enumerate() {
            if self.should_stop(id) {
                log::debug!("{id}: stopping before {kind}");
                return;
            }
            if self
                .transition(
                    id,
                    |job| job.begin_stage(index),
                    |_| JobEvent::StageStarted {
                        id,
                        index,
                        name: kind.name(),
                    },
                )
                .is_none()
            {
                return;
            }
            log::debug!("{id}: stage {index} ({kind}) started");

            let started = Instant::now();
            let outcome = self.run_blocking(id, index, kind, state, &config).await;
            let duration = started.elapsed();

            if self.should_stop(id) {
                log::debug!("{id}: discarding {kind} output of stopped job");
                return;
            }

            let (next_state, encoded) = match outcome {
                Ok(done) => done,
                Err(err) => {
                    self.fail(id, index, &err, duration);
                    return;
                }
            };

            let result = self.store(id, encoded);
            if self
                .transition(
                    id,
                    |job| job.complete_stage(index, result, duration),
                    |_| JobEvent::StageCompleted {
                        id,
                        index,
                        name: kind.name(),
                        duration,
                    },
                )
                .is_none()
            {
                // Aborted or released while storing.
                self.artifacts.revoke_job(id);
                return;
            }
            log::debug!("{id}: stage {index} ({kind}) done in {duration:?}");

            state = next_state;
            tokio::task::yield_now().await;
        }

        if self
            .transition(id, JobStatus::finish, |_| JobEvent::Completed { id })
            .is_some()
        {
            log::info!("{id}: completed {} stage(s)", config.stages.len());
        }
    }

    /// Run one stage and encode its images on the blocking pool.
    async fn run_blocking(
        &self,
        id: JobId,
        index: usize,
        kind: StageKind,
        mut state: PipelineState,
        config: &Arc<PipelineConfig>,
    ) -> Result<(PipelineState, EncodedOutput), JobError> {
        let registry = Arc::clone(&self.registry);
        let events = self.events.clone();
        let config = Arc::clone(config);

        tokio::task::spawn_blocking(move || -> Result<_, JobError> {
            let mut report = |progress: u8| {
                registry.update_and_notify(
                    id,
                    |job| job.set_stage_progress(index, progress),
                    |status| {
                        events
                            .send(JobEvent::StageProgress {
                                id,
                                index,
                                progress,
                                overall: status.overall_progress(),
                            })
                            .ok();
                    },
                );
            };
            let output = run_stage(&mut state, kind, &config, &mut report)?;
            let encoded = EncodedOutput::encode(&output)?;
            Ok((state, encoded))
        })
        .await?
    }

    /// Register encoded images as artifacts.
    fn store(&self, id: JobId, encoded: EncodedOutput) -> StageResult {
        match encoded {
            EncodedOutput::Preview {
                preview,
                placeholder,
            } => {
                let dimensions = preview.dimensions;
                StageResult::Preview {
                    preview_url: self.artifacts.insert(id, preview),
                    placeholder_url: self.artifacts.insert(id, placeholder),
                    dimensions,
                }
            }
            EncodedOutput::Processed { image, report } => {
                let dimensions = image.dimensions;
                StageResult::Processed {
                    processed_url: self.artifacts.insert(id, image),
                    dimensions,
                    report,
                }
            }
            EncodedOutput::Thumbnail { thumbnail } => {
                let dimensions = thumbnail.dimensions;
                StageResult::Thumbnail {
                    thumbnail_url: self.artifacts.insert(id, thumbnail),
                    dimensions,
                }
            }
        }
    }

    fn fail(&self, id: JobId, index: usize, err: &JobError, duration: Duration) {
        let error = err.to_string();
        if self
            .transition(
                id,
                |job| job.fail_stage(index, error.clone(), duration),
                |_| JobEvent::Failed {
                    id,
                    index,
                    error: error.clone(),
                },
            )
            .is_some()
        {
            log::warn!("{id}: stage {index} failed: {error}");
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
