use std::time::Duration;

use time::OffsetDateTime;

use cirun_model::{Driver, RunningJob, ShutdownCause};

/// GitHub cancels jobs after 35 days; stop five minutes earlier so they can be rerun.
pub const GITHUB_JOB_CEILING: Duration = Duration::from_secs((35 * 24 * 60 - 5) * 60);

pub const WATCHDOG_TICK: Duration = Duration::from_secs(60);

/// Shuts the runner down before a job reaches the platform's hard time limit.
#[derive(Debug, Clone)]
pub struct JobWatchdog {
    ceiling: Duration,
}

impl JobWatchdog {
    /// Only GitHub has a ceiling, and stopping early only helps when jobs get rerun.
    pub fn for_driver(driver: Driver, retries_enabled: bool) -> Option<Self> {
        (driver == Driver::Github && retries_enabled).then_some(Self {
            ceiling: GITHUB_JOB_CEILING,
        })
    }

    pub fn check(&self, jobs: &[RunningJob], now: OffsetDateTime) -> Option<ShutdownCause> {
        let ceiling = self.ceiling.as_secs() as i64;
        jobs.iter()
            .any(|job| (now - job.start_time).whole_seconds() > ceiling)
            .then(|| ShutdownCause::reason("timeout:35days"))
    }
}
