//! In-memory job registry.
//!
//! One registry is owned by each [`crate::Orchestrator`]; there is no
//! process-wide job map. Every entry keeps a `watch` channel carrying
//! its latest snapshot so readers can await changes instead of polling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use cardfx_pipeline::StageKind;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::job::{JobId, JobStatus};

struct Entry {
    status: JobStatus,
    updates: watch::Sender<JobStatus>,
}

/// Mapping from job id to job record.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Entry>>,
    next_id: AtomicU64,
}

impl JobRegistry {
    /// An empty registry. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new pending job over `stages`.
    pub fn insert(&self, stages: &[StageKind]) -> JobId {
        self.insert_and_notify(stages, |_| {})
    }

    /// Register a new pending job and hand its first snapshot to `notify`
    /// before any transition can be applied to it.
    pub fn insert_and_notify(
        &self,
        stages: &[StageKind],
        notify: impl FnOnce(&JobStatus),
    ) -> JobId {
        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let status = JobStatus::new(id, stages);
        let (updates, _) = watch::channel(status.clone());
        let mut jobs = self.jobs.write();
        notify(&status);
        jobs.insert(id, Entry { status, updates });
        id
    }

    /// Snapshot of one job.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.read().get(&id).map(|e| e.status.clone())
    }

    /// Receiver for the latest snapshot of one job.
    ///
    /// The channel closes when the job is removed.
    #[must_use]
    pub fn watch(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.jobs.read().get(&id).map(|e| e.updates.subscribe())
    }

    /// Apply a transition to one job.
    ///
    /// `transition` returns whether it changed the record; watchers are
    /// only notified when it did. Returns the new snapshot on change,
    /// `None` if the job is unknown or nothing changed.
    pub fn update(
        &self,
        id: JobId,
        transition: impl FnOnce(&mut JobStatus) -> bool,
    ) -> Option<JobStatus> {
        self.update_and_notify(id, transition, |_| {})
    }

    /// Like [`update`](Self::update), but also hands the new snapshot to
    /// `notify` before the registry lock is released.
    ///
    /// Notifications sent from `notify` are therefore ordered exactly like
    /// the transitions that caused them, whichever thread applied them.
    /// `notify` must not touch the registry.
    pub fn update_and_notify(
        &self,
        id: JobId,
        transition: impl FnOnce(&mut JobStatus) -> bool,
        notify: impl FnOnce(&JobStatus),
    ) -> Option<JobStatus> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(&id)?;
        if !transition(&mut entry.status) {
            return None;
        }
        let snapshot = entry.status.clone();
        entry.updates.send_replace(snapshot.clone());
        notify(&snapshot);
        Some(snapshot)
    }

    /// Remove a job, returning its last snapshot.
    pub fn remove(&self, id: JobId) -> Option<JobStatus> {
        self.jobs.write().remove(&id).map(|e| e.status)
    }

    /// Ids of every registered job, ascending.
    #[must_use]
    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether no jobs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Drop every job. Ids keep counting up.
    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
