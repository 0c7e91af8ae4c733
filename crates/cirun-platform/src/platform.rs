use std::sync::Arc;

use async_trait::async_trait;

use cirun_model::{CommandSpec, Driver, JobEvent, RunnerConfig, RunnerInfo, RunnerLabels};

use crate::{Bitbucket, Github, Gitlab, PlatformError, RepoRef};

/// Everything the lifecycle needs from a CI platform.
#[async_trait]
pub trait CiPlatform: Send + Sync {
    fn driver(&self) -> Driver;

    /// Verify the token can access the repository.
    async fn repo_token_check(&self) -> Result<(), PlatformError>;

    async fn list_runners(&self) -> Result<Vec<RunnerInfo>, PlatformError>;

    fn find_runner_by_name<'a>(
        &self,
        name: &str,
        runners: &'a [RunnerInfo],
    ) -> Option<&'a RunnerInfo> {
        runners.iter().find(|r| r.name == name)
    }

    /// Runners carrying every label in `labels`.
    fn find_runners_by_labels<'a>(
        &self,
        labels: &RunnerLabels,
        runners: &'a [RunnerInfo],
    ) -> Vec<&'a RunnerInfo> {
        runners
            .iter()
            .filter(|r| labels.is_subset_of(&r.labels))
            .collect()
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), PlatformError>;

    async fn rerun_pipeline_job(&self, pipeline_id: &str, job_id: &str)
    -> Result<(), PlatformError>;

    /// Register the runner and install its agent; returns the command that runs it.
    async fn prepare_runner(&self, config: &RunnerConfig) -> Result<CommandSpec, PlatformError>;

    /// Extract job events from a raw output chunk of the runner agent.
    async fn parse_log_chunk(
        &self,
        raw: &[u8],
        runner_name: &str,
    ) -> Result<Vec<JobEvent>, PlatformError>;
}

/// Build the client for `driver`.
pub fn connect(
    driver: Driver,
    repo: &str,
    token: &str,
) -> Result<Arc<dyn CiPlatform>, PlatformError> {
    let repo = RepoRef::parse(repo)?;
    let platform: Arc<dyn CiPlatform> = match driver {
        Driver::Github => Arc::new(Github::new(repo, token)?),
        Driver::Gitlab => Arc::new(Gitlab::new(repo, token)?),
        Driver::Bitbucket => Arc::new(Bitbucket::new(repo, token)?),
    };
    Ok(platform)
}
