//! Job lifecycle notifications.

use std::time::Duration;

use serde::Serialize;

use crate::job::JobId;

/// Something that happened to a job.
///
/// Events for one job are broadcast in the order they happened; only
/// transitions that changed the job's record are reported. Each event is
/// sent while that record is still locked, so a progress report racing an
/// abort is either delivered before [`JobEvent::Aborted`] or not at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    /// The job was registered and its runner spawned.
    Started {
        /// Job id.
        id: JobId,
    },
    /// A stage began.
    StageStarted {
        /// Job id.
        id: JobId,
        /// Stage index.
        index: usize,
        /// Stage name.
        name: &'static str,
    },
    /// A stage reported progress.
    StageProgress {
        /// Job id.
        id: JobId,
        /// Stage index.
        index: usize,
        /// Stage percentage.
        progress: u8,
        /// Whole-job fraction in `[0, 1]`.
        overall: f64,
    },
    /// A stage finished successfully.
    StageCompleted {
        /// Job id.
        id: JobId,
        /// Stage index.
        index: usize,
        /// Stage name.
        name: &'static str,
        /// Wall time the stage took.
        duration: Duration,
    },
    /// Every stage completed.
    Completed {
        /// Job id.
        id: JobId,
    },
    /// A stage failed and the job halted.
    Failed {
        /// Job id.
        id: JobId,
        /// Index of the failed stage.
        index: usize,
        /// Failure message.
        error: String,
    },
    /// The job was cancelled.
    Aborted {
        /// Job id.
        id: JobId,
    },
}

impl JobEvent {
    /// The job this event is about.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Started { id }
            | Self::StageStarted { id, .. }
            | Self::StageProgress { id, .. }
            | Self::StageCompleted { id, .. }
            | Self::Completed { id }
            | Self::Failed { id, .. }
            | Self::Aborted { id } => *id,
        }
    }

    /// Whether no further events follow for this job.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Aborted { .. }
        )
    }
}
