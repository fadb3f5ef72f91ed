//! Job registry
//!
//! The single source of truth for upload state: a mapping from [`UploadId`]
//! to [`UploadJob`] held inside a `tokio::sync::watch` channel.
//!
//! # Design
//!
//! - Every mutation happens under the channel's internal lock, so readers
//!   always observe a whole, consistent [`RegistrySnapshot`]
//! - Subscribers are woken on every effective change; no-op updates do not
//!   notify
//! - Jobs are kept in insertion order for stable display and are never
//!   removed
//! - Only the engine writes; observers receive snapshots and owned clones

use std::collections::HashMap;
use tokio::sync::watch;

use crate::job::{JobPatch, UploadId, UploadJob, UploadStatus};
use crate::progress::AggregateProgress;

/// Consistent, ordered view of every job at one instant
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    jobs: Vec<UploadJob>,
    index: HashMap<UploadId, usize>,
}

impl RegistrySnapshot {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: &UploadId) -> Option<&UploadJob> {
        self.index.get(id).map(|&i| &self.jobs[i])
    }

    /// Jobs in insertion order
    pub fn values(&self) -> &[UploadJob] {
        &self.jobs
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadJob> {
        self.jobs.iter()
    }

    pub fn count_by_status(&self, status: UploadStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }

    /// Aggregate progress over this snapshot
    pub fn progress(&self) -> AggregateProgress {
        AggregateProgress::from_jobs(&self.jobs)
    }

    fn get_mut(&mut self, id: &UploadId) -> Option<&mut UploadJob> {
        match self.index.get(id) {
            Some(&i) => self.jobs.get_mut(i),
            None => None,
        }
    }
}

/// Owned registry of upload jobs with snapshot reads and change notification
pub(crate) struct JobRegistry {
    state: watch::Sender<RegistrySnapshot>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(RegistrySnapshot::default());
        Self { state }
    }

    /// Insert a job under `id`
    ///
    /// Returns `false` and leaves the registry untouched if the id is
    /// already present; ids are never reused.
    pub(crate) fn insert(&self, id: UploadId, mut job: UploadJob) -> bool {
        job.id = id;
        self.state.send_if_modified(|snapshot| {
            if snapshot.index.contains_key(&id) {
                return false;
            }
            snapshot.index.insert(id, snapshot.jobs.len());
            snapshot.jobs.push(job);
            true
        })
    }

    /// Clone of the job stored under `id`
    pub(crate) fn get(&self, id: &UploadId) -> Option<UploadJob> {
        self.state.borrow().get(id).cloned()
    }

    pub(crate) fn contains(&self, id: &UploadId) -> bool {
        self.state.borrow().index.contains_key(id)
    }

    /// Apply a partial update on behalf of attempt `attempt`
    ///
    /// The update is dropped unless `attempt` is still the job's current
    /// attempt and that attempt has not settled yet. Returns whether the
    /// update was applied.
    pub(crate) fn update_attempt(&self, id: &UploadId, attempt: u64, patch: JobPatch) -> bool {
        let settles = patch.status.is_some_and(|status| status.is_settled());
        let mut applied = false;

        self.state.send_if_modified(|snapshot| {
            let Some(job) = snapshot.get_mut(id) else {
                return false;
            };
            if job.attempt != attempt || job.status.is_settled() {
                return false;
            }
            applied = true;
            let mut changed = patch.apply(job);
            if settles && job.cancellation.take().is_some() {
                changed = true;
            }
            changed
        });

        applied
    }

    /// Run `f` against the job under `id` inside a single write
    ///
    /// Subscribers are notified only when `f` reports a change.
    pub(crate) fn modify<R, F>(&self, id: &UploadId, f: F) -> Option<R>
    where
        F: FnOnce(&mut UploadJob) -> R,
        R: Changed,
    {
        let mut result = None;
        self.state.send_if_modified(|snapshot| match snapshot.get_mut(id) {
            Some(job) => {
                let r = f(job);
                let changed = r.changed();
                result = Some(r);
                changed
            }
            None => false,
        });
        result
    }

    /// Copy of the current state
    pub(crate) fn snapshot(&self) -> RegistrySnapshot {
        self.state.borrow().clone()
    }

    /// Aggregate progress computed under the read lock
    pub(crate) fn progress(&self) -> AggregateProgress {
        self.state.borrow().progress()
    }

    /// Receiver that is woken on every registry change
    pub(crate) fn subscribe(&self) -> watch::Receiver<RegistrySnapshot> {
        self.state.subscribe()
    }
}

/// Result of a registry modification that may or may not have changed state
pub(crate) trait Changed {
    fn changed(&self) -> bool;
}

impl Changed for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl<T> Changed for Option<T> {
    fn changed(&self) -> bool {
        self.is_some()
    }
}
