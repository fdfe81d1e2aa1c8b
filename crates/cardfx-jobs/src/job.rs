//! Job records and their state machine.
//!
//! A job moves `Pending -> Processing -> Completed`, or ends early in
//! `Failed` or `Aborted`. Each stage record moves
//! `Pending -> Processing -> Completed | Failed`. Every transition method
//! returns whether it changed anything: updates that would move a job or
//! stage backward, or touch a terminal job, are ignored and return
//! `false`.

use std::fmt;
use std::time::Duration;

use cardfx_pipeline::{Dimensions, ProcessReport, StageKind};
use serde::{Deserialize, Serialize};

/// Identifier of one processing job. Displayed as `job-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    /// Registered, no stage started yet.
    Pending,
    /// A stage is running.
    Processing,
    /// Every stage completed.
    Completed,
    /// A stage failed; later stages never ran.
    Failed,
    /// Cancelled by the caller.
    Aborted,
}

impl JobState {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Lifecycle of one stage within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageStatus {
    /// Not started.
    Pending,
    /// Running.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl StageStatus {
    /// Position in the forward-only ordering of statuses.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }
}

/// Artifacts and details a finished stage produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StageResult {
    /// Preview-stage artifacts.
    Preview {
        /// URL of the downscaled preview PNG.
        preview_url: String,
        /// URL of the blurred placeholder PNG.
        placeholder_url: String,
        /// Preview size.
        dimensions: Dimensions,
    },
    /// Processing-stage artifact.
    Processed {
        /// URL of the processed PNG.
        processed_url: String,
        /// Processed image size.
        dimensions: Dimensions,
        /// Detection and crop details.
        report: ProcessReport,
    },
    /// Thumbnail-stage artifact.
    Thumbnail {
        /// URL of the thumbnail PNG.
        thumbnail_url: String,
        /// Thumbnail size.
        dimensions: Dimensions,
    },
}

impl StageResult {
    /// Every artifact URL this result references.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        match self {
            Self::Preview {
                preview_url,
                placeholder_url,
                ..
            } => vec![preview_url, placeholder_url],
            Self::Processed { processed_url, .. } => vec![processed_url],
            Self::Thumbnail { thumbnail_url, .. } => vec![thumbnail_url],
        }
    }
}

/// One stage of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Reported stage name, e.g. `client-preview`.
    pub name: String,
    /// Which stage this is.
    pub kind: StageKind,
    /// Current status.
    pub status: StageStatus,
    /// Percentage in `0..=100`.
    pub progress: u8,
    /// Output, once completed.
    pub result: Option<StageResult>,
    /// Failure message, once failed.
    pub error: Option<String>,
    /// Wall time the stage took, once finished.
    pub duration: Option<Duration>,
}

impl StageRecord {
    fn new(kind: StageKind) -> Self {
        Self {
            name: kind.name().to_owned(),
            kind,
            status: StageStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            duration: None,
        }
    }

    fn advance(&mut self, status: StageStatus) -> bool {
        if status.rank() <= self.status.rank() {
            return false;
        }
        self.status = status;
        true
    }
}

/// Snapshot of one job, as returned by status reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// The job's id.
    pub id: JobId,
    /// Whole-job state.
    pub state: JobState,
    /// Stage records, in execution order.
    pub stages: Vec<StageRecord>,
    /// Index of the stage running or last run.
    pub current_stage_index: usize,
    /// True once every stage has completed.
    pub is_complete: bool,
    /// Latest preview URL.
    pub preview_url: Option<String>,
    /// Latest processed-image URL.
    pub processed_url: Option<String>,
    /// Latest thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Detection and crop details from the processing stage.
    pub metadata: Option<ProcessReport>,
    /// Failure message of the stage that failed the job.
    pub error: Option<String>,
}

impl JobStatus {
    /// A fresh job with every stage pending.
    #[must_use]
    pub fn new(id: JobId, stages: &[StageKind]) -> Self {
        Self {
            id,
            state: JobState::Pending,
            stages: stages.iter().copied().map(StageRecord::new).collect(),
            current_stage_index: 0,
            is_complete: false,
            preview_url: None,
            processed_url: None,
            thumbnail_url: None,
            metadata: None,
            error: None,
        }
    }

    /// Overall progress as a fraction in `[0, 1]`.
    ///
    /// Each stage is an equal `1/N` share regardless of its cost: the
    /// completed stages plus the running stage's own percentage scaled
    /// to its share.
    #[must_use]
    pub fn overall_progress(&self) -> f64 {
        if self.is_complete {
            return 1.0;
        }
        let total = self.stages.len();
        if total == 0 {
            return 0.0;
        }
        let completed = self
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count();
        let current = self
            .stages
            .iter()
            .find(|s| s.status == StageStatus::Processing)
            .map_or(0, |s| s.progress);
        #[allow(clippy::cast_precision_loss)]
        let total = total as f64;
        #[allow(clippy::cast_precision_loss)]
        let fraction = completed as f64 / total + f64::from(current) / 100.0 / total;
        fraction.clamp(0.0, 1.0)
    }

    /// Mark stage `index` as running.
    pub fn begin_stage(&mut self, index: usize) -> bool {
        if self.state.is_terminal() || index < self.current_stage_index {
            return false;
        }
        let Some(stage) = self.stages.get_mut(index) else {
            return false;
        };
        if !stage.advance(StageStatus::Processing) {
            return false;
        }
        self.state = JobState::Processing;
        self.current_stage_index = index;
        true
    }

    /// Raise the running stage's percentage. Lower values are ignored.
    pub fn set_stage_progress(&mut self, index: usize, progress: u8) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(stage) = self.stages.get_mut(index) else {
            return false;
        };
        let progress = progress.min(100);
        if stage.status != StageStatus::Processing || progress <= stage.progress {
            return false;
        }
        stage.progress = progress;
        true
    }

    /// Record stage `index` as finished with `result`.
    ///
    /// The stage's artifact URLs are promoted to the job-level fields.
    pub fn complete_stage(&mut self, index: usize, result: StageResult, duration: Duration) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(stage) = self.stages.get_mut(index) else {
            return false;
        };
        if stage.status != StageStatus::Processing || !stage.advance(StageStatus::Completed) {
            return false;
        }
        stage.progress = 100;
        stage.duration = Some(duration);
        match &result {
            StageResult::Preview { preview_url, .. } => {
                self.preview_url = Some(preview_url.clone());
            }
            StageResult::Processed {
                processed_url,
                report,
                ..
            } => {
                self.processed_url = Some(processed_url.clone());
                self.metadata = Some(report.clone());
            }
            StageResult::Thumbnail { thumbnail_url, .. } => {
                self.thumbnail_url = Some(thumbnail_url.clone());
            }
        }
        stage.result = Some(result);
        true
    }

    /// Record stage `index` as failed, failing the whole job.
    pub fn fail_stage(&mut self, index: usize, error: String, duration: Duration) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let Some(stage) = self.stages.get_mut(index) else {
            return false;
        };
        if !stage.advance(StageStatus::Failed) {
            return false;
        }
        stage.error = Some(error.clone());
        stage.duration = Some(duration);
        self.current_stage_index = index;
        self.state = JobState::Failed;
        self.error = Some(error);
        true
    }

    /// Mark the job completed. Only valid once every stage completed.
    pub fn finish(&mut self) -> bool {
        if self.state.is_terminal()
            || self
                .stages
                .iter()
                .any(|s| s.status != StageStatus::Completed)
        {
            return false;
        }
        self.state = JobState::Completed;
        self.is_complete = true;
        true
    }

    /// Cancel the job.
    ///
    /// Artifact URLs are cleared from the record since the orchestrator
    /// revokes them alongside.
    pub fn abort(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Aborted;
        self.preview_url = None;
        self.processed_url = None;
        self.thumbnail_url = None;
        for stage in &mut self.stages {
            stage.result = None;
        }
        true
    }

    /// Every artifact URL referenced by this job.
    #[must_use]
    pub fn artifact_urls(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter_map(|s| s.result.as_ref())
            .flat_map(StageResult::urls)
            .collect()
    }
}
