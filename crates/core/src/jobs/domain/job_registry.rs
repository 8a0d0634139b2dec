use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::jobs::domain::event_channel::EventChannel;
use crate::jobs::domain::job::{Job, JobEvent, JobId, JobParams, JobStatus, JobView, ProgressSnapshot};
use crate::jobs::domain::job_error::JobError;
use crate::pipeline::processing_stats::ProcessingStats;
use crate::shared::constants::EVENT_CHANNEL_CAPACITY;

/// All jobs of this process behind one lock.
///
/// One worker writes a given job; any number of readers may poll it.
/// Clones share the same map.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
    event_capacity: usize,
}

impl JobRegistry {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            event_capacity,
        }
    }

    pub fn create(&self, video_id: &str, params: JobParams) -> JobId {
        let job = Job::new(video_id, params, self.event_capacity);
        let id = job.id;
        self.lock().insert(id, job);
        log::info!("Created job {id} for {video_id}");
        id
    }

    pub fn view(&self, id: JobId) -> Option<JobView> {
        self.lock().get(&id).map(Job::view)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.lock().get(&id).map(|job| job.status)
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    /// Moves a job to `status` and announces it on the event channel.
    ///
    /// A terminal status is final: later updates are rejected with
    /// [`JobError::AlreadyFinished`] and push nothing.
    pub fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), JobError> {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return Err(JobError::AlreadyFinished(id));
            }
            job.status = status;
            if error.is_some() {
                job.error = error.clone();
            }
            match status {
                JobStatus::Processing if job.started_at.is_none() => {
                    job.started_at = Some(Utc::now());
                }
                s if s.is_terminal() => job.completed_at = Some(Utc::now()),
                _ => {}
            }
            job.events.push(JobEvent::Status { status, error });
            Ok(())
        })?
    }

    /// Records a progress snapshot and pushes it, unless the job already
    /// finished.
    pub fn update_progress(
        &self,
        id: JobId,
        current: usize,
        total: usize,
        fps: f64,
        preview: Option<PathBuf>,
    ) -> Result<(), JobError> {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return;
            }
            if preview.is_some() {
                job.latest_preview = preview.clone();
            }
            let snapshot = ProgressSnapshot::compute(current, total, fps, preview);
            job.progress = snapshot.clone();
            job.events.push(JobEvent::Progress(snapshot));
        })
    }

    /// Marks segment `number` as written; kept sorted without duplicates.
    pub fn add_segment(&self, id: JobId, number: usize) -> Result<(), JobError> {
        self.with_job(id, |job| {
            if let Err(pos) = job.segments.binary_search(&number) {
                job.segments.insert(pos, number);
            }
        })
    }

    pub fn set_stats(&self, id: JobId, stats: ProcessingStats) -> Result<(), JobError> {
        self.with_job(id, |job| job.stats = Some(stats))
    }

    pub fn push_event(&self, id: JobId, event: JobEvent) -> Result<(), JobError> {
        self.with_job(id, |job| job.events.push(event))
    }

    /// Flags the job for cancellation and marks it `cancelled`.
    ///
    /// The worker checks the flag once per frame and stops early.
    pub fn cancel(&self, id: JobId) -> Result<(), JobError> {
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return Err(JobError::AlreadyFinished(id));
            }
            job.cancel.store(true, Ordering::Relaxed);
            Ok(())
        })??;
        log::info!("Cancelling job {id}");
        self.update_status(id, JobStatus::Cancelled, None)
    }

    pub fn cancel_token(&self, id: JobId) -> Option<Arc<AtomicBool>> {
        self.lock().get(&id).map(|job| job.cancel.clone())
    }

    pub fn events(&self, id: JobId) -> Option<EventChannel> {
        self.lock().get(&id).map(|job| job.events.clone())
    }

    fn with_job<T>(&self, id: JobId, f: impl FnOnce(&mut Job) -> T) -> Result<T, JobError> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        Ok(f(job))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(events: Vec<JobEvent>) -> Vec<JobStatus> {
        events
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Status { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_lifecycle_timestamps_set_once() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        assert_eq!(registry.status(id), Some(JobStatus::Queued));

        registry.update_status(id, JobStatus::Processing, None).unwrap();
        let started = registry.view(id).unwrap().started_at.unwrap();
        registry.update_status(id, JobStatus::Processing, None).unwrap();
        assert_eq!(registry.view(id).unwrap().started_at, Some(started));

        registry.update_status(id, JobStatus::Complete, None).unwrap();
        let view = registry.view(id).unwrap();
        let completed = view.completed_at.unwrap();
        assert!(completed >= started);

        assert!(matches!(
            registry.update_status(id, JobStatus::Failed, Some("late".into())),
            Err(JobError::AlreadyFinished(_))
        ));
        let view = registry.view(id).unwrap();
        assert_eq!(view.status, JobStatus::Complete);
        assert_eq!(view.completed_at, Some(completed));
        assert!(view.error.is_none());
    }

    #[test]
    fn test_status_changes_are_pushed() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        registry.update_status(id, JobStatus::Processing, None).unwrap();
        registry
            .update_status(id, JobStatus::Failed, Some("decoder exploded".into()))
            .unwrap();

        let events = registry.events(id).unwrap().drain();
        assert_eq!(statuses(events), vec![JobStatus::Processing, JobStatus::Failed]);
        assert_eq!(registry.view(id).unwrap().error.as_deref(), Some("decoder exploded"));
    }

    #[test]
    fn test_progress_ignored_after_terminal() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        registry.update_progress(id, 30, 90, 15.0, None).unwrap();
        assert_eq!(registry.view(id).unwrap().progress.current, 30);

        registry.cancel(id).unwrap();
        registry.events(id).unwrap().drain();
        registry.update_progress(id, 60, 90, 15.0, None).unwrap();

        assert_eq!(registry.view(id).unwrap().progress.current, 30);
        assert!(registry.events(id).unwrap().is_empty());
    }

    #[test]
    fn test_preview_is_remembered() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        registry
            .update_progress(id, 10, 90, 5.0, Some(PathBuf::from("/p/x_preview.jpg")))
            .unwrap();
        registry.update_progress(id, 30, 90, 5.0, None).unwrap();
        let view = registry.view(id).unwrap();
        assert_eq!(view.latest_preview, Some(PathBuf::from("/p/x_preview.jpg")));
        assert!(view.progress.preview.is_none());
    }

    #[test]
    fn test_segments_sorted_and_unique() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        for n in [3, 1, 2, 3, 1] {
            registry.add_segment(id, n).unwrap();
        }
        assert_eq!(registry.view(id).unwrap().segments, vec![1, 2, 3]);
    }

    #[test]
    fn test_cancel_sets_token_and_is_final() {
        let registry = JobRegistry::default();
        let id = registry.create("clip.mp4", JobParams::default());
        let token = registry.cancel_token(id).unwrap();
        assert!(!token.load(Ordering::Relaxed));

        registry.cancel(id).unwrap();
        assert!(token.load(Ordering::Relaxed));
        assert_eq!(registry.status(id), Some(JobStatus::Cancelled));
        assert!(registry.view(id).unwrap().completed_at.is_some());
        assert!(matches!(registry.cancel(id), Err(JobError::AlreadyFinished(_))));
        assert!(registry.update_status(id, JobStatus::Complete, None).is_err());
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::default();
        let id = uuid::Uuid::new_v4();
        assert!(registry.view(id).is_none());
        assert!(matches!(registry.cancel(id), Err(JobError::NotFound(_))));
        assert!(matches!(
            registry.update_progress(id, 1, 1, 1.0, None),
            Err(JobError::NotFound(_))
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = JobRegistry::default();
        let other = registry.clone();
        let id = registry.create("clip.mp4", JobParams::default());
        other.update_status(id, JobStatus::Processing, None).unwrap();
        assert_eq!(registry.status(id), Some(JobStatus::Processing));
        assert_eq!(registry.ids(), vec![id]);
    }
}
