use tracing::debug;

use cirun_model::{JobEvent, JobStatus, RunningJob, ShutdownCause};

/// Jobs currently executing on the runner, in start order.
///
/// Sole writer of the pending-jobs registry; watchers and the teardown only read it.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: Vec<RunningJob>,
    single: bool,
}

impl JobTracker {
    pub fn new(single: bool) -> Self {
        Self {
            jobs: Vec::new(),
            single,
        }
    }

    /// Record a job event; returns a shutdown cause when single-job mode completes.
    pub fn apply(&mut self, event: &JobEvent) -> Option<ShutdownCause> {
        match event.status {
            JobStatus::JobStarted => {
                self.jobs.push(RunningJob {
                    id: event.job_id.clone().unwrap_or_default(),
                    pipeline_id: event.pipeline_id.clone().unwrap_or_default(),
                    start_time: event.date,
                });
                None
            }
            JobStatus::JobEnded => {
                // LIFO: end events carry no reliable job id, so the most recent
                // start is assumed to be the one that finished. Wrong when
                // concurrent jobs finish out of start order.
                match self.jobs.pop() {
                    Some(job) => debug!(job = %job.id, "job removed from pending set"),
                    None => debug!("job end without a pending job"),
                }
                self.single
                    .then(|| ShutdownCause::reason("single job"))
            }
        }
    }

    pub fn pending(&self) -> &[RunningJob] {
        &self.jobs
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.jobs.len()
    }
}
