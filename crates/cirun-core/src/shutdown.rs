use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use cirun_exec::RunnerProcess;
use cirun_infra::Provisioner;
use cirun_model::{OrchestratorState, RunnerConfig, RunningJob, ShutdownRequest};
use cirun_platform::CiPlatform;

/// Lifecycle state shared between the orchestrator and its observers.
///
/// Transitions only move forward; the move into `ShuttingDown` succeeds once.
#[derive(Debug, Clone)]
pub struct LifecycleState(Arc<AtomicU8>);

impl Default for LifecycleState {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(OrchestratorState::Starting.as_u8())))
    }
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> OrchestratorState {
        OrchestratorState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn mark_running(&self) -> bool {
        self.0
            .compare_exchange(
                OrchestratorState::Starting.as_u8(),
                OrchestratorState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Returns `true` for the single caller allowed to run the teardown.
    pub fn begin_shutdown(&self) -> bool {
        let target = OrchestratorState::ShuttingDown.as_u8();
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < target).then_some(target)
            })
            .is_ok()
    }

    pub fn mark_terminated(&self) {
        self.0
            .store(OrchestratorState::Terminated.as_u8(), Ordering::Release);
    }
}

/// Ordered, at-most-once teardown.
///
/// Steps: unregister and stop the local runner, rerun interrupted jobs,
/// destroy declared infrastructure. A failing step is logged and does not
/// prevent the following ones.
pub struct ShutdownSequence {
    platform: Arc<dyn CiPlatform>,
    provisioner: Arc<dyn Provisioner>,
    state: LifecycleState,
    runner_name: String,
    retries: bool,
}

impl ShutdownSequence {
    pub fn new(
        config: &RunnerConfig,
        platform: Arc<dyn CiPlatform>,
        provisioner: Arc<dyn Provisioner>,
        state: LifecycleState,
    ) -> Self {
        Self {
            platform,
            provisioner,
            state,
            runner_name: config.name.clone(),
            retries: config.retries_enabled(),
        }
    }

    /// Run the teardown; returns the exit code, or `None` if it already ran.
    pub async fn execute(
        &self,
        request: ShutdownRequest,
        process: Option<RunnerProcess>,
        pending: Vec<RunningJob>,
    ) -> Option<i32> {
        if !self.state.begin_shutdown() {
            debug!(cause = %request.cause, "shutdown already in progress");
            return None;
        }

        let message = request.cause.as_message();
        if request.cause.is_error() {
            error!(error = message, status = "terminated", "runner status");
        } else {
            info!(reason = message, status = "terminated", "runner status");
        }

        if !request.cloud {
            if let Some(process) = process {
                self.stop_runner(process).await;
            }
            if self.retries {
                self.rerun_jobs(pending).await;
            }
        }

        if let Some(dir) = &request.destroy_target {
            self.destroy_infra(dir, request.destroy_delay).await;
        }

        self.state.mark_terminated();
        Some(request.cause.exit_code())
    }

    async fn stop_runner(&self, process: RunnerProcess) {
        info!(name = %self.runner_name, "Unregistering runner...");
        match self.platform.unregister_runner(&self.runner_name).await {
            Ok(()) => info!("Runner unregistered"),
            Err(e) => error!("Failed to unregister runner: {e}"),
        }

        if let Err(e) = process.terminate().await {
            error!("Failed to stop runner process: {e}");
        }
    }

    async fn rerun_jobs(&self, pending: Vec<RunningJob>) {
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Still pending jobs, retrying them...");

        let mut reruns = JoinSet::new();
        for job in pending {
            if job.pipeline_id.is_empty() {
                warn!(job = %job.id, "job has no pipeline id, cannot rerun it");
                continue;
            }
            let platform = Arc::clone(&self.platform);
            reruns.spawn(async move {
                let res = platform.rerun_pipeline_job(&job.pipeline_id, &job.id).await;
                (job, res)
            });
        }

        while let Some(joined) = reruns.join_next().await {
            match joined {
                Ok((job, Ok(()))) => {
                    info!(job = %job.id, pipeline = %job.pipeline_id, "Job rerun requested")
                }
                Ok((job, Err(e))) => {
                    error!(job = %job.id, pipeline = %job.pipeline_id, "Failed to rerun job: {e}")
                }
                Err(e) => error!("rerun task failed: {e}"),
            }
        }
    }

    async fn destroy_infra(&self, dir: &Path, delay: Duration) {
        info!("Waiting {} seconds to destroy", delay.as_secs());
        tokio::time::sleep(delay).await;

        match self.provisioner.destroy(dir).await {
            Ok(output) => debug!(output = %output, "infrastructure destroyed"),
            Err(e) => error!("Failed destroying terraform: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use cirun_model::{Driver, ShutdownCause};

    use super::*;
    use crate::testing::{MockPlatform, MockProvisioner, local_config};

    fn job(id: &str, pipeline: &str) -> RunningJob {
        RunningJob {
            id: id.into(),
            pipeline_id: pipeline.into(),
            start_time: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn state_moves_forward_only() {
        let state = LifecycleState::new();
        assert_eq!(state.get(), OrchestratorState::Starting);
        assert!(state.mark_running());
        assert!(!state.mark_running());

        assert!(state.begin_shutdown());
        assert!(!state.begin_shutdown());
        assert_eq!(state.get(), OrchestratorState::ShuttingDown);

        state.mark_terminated();
        assert!(!state.begin_shutdown());
        assert_eq!(state.get(), OrchestratorState::Terminated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_tear_down_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(Driver::Github, dir.path());
        config.tf_resource = Some("e30=".into());
        config.destroy_delay = Duration::ZERO;

        let platform = Arc::new(MockPlatform::new(Driver::Github));
        let provisioner = Arc::new(MockProvisioner::default());
        let seq = Arc::new(ShutdownSequence::new(
            &config,
            platform.clone(),
            provisioner.clone(),
            LifecycleState::new(),
        ));

        let mut set = JoinSet::new();
        for i in 0..8 {
            let seq = Arc::clone(&seq);
            let request = ShutdownRequest::new(ShutdownCause::reason(format!("trigger-{i}")), &config);
            set.spawn(async move { seq.execute(request, None, vec![job("1", "10")]).await });
        }

        let mut ran = 0;
        while let Some(res) = set.join_next().await {
            if let Some(code) = res.unwrap() {
                assert_eq!(code, 0);
                ran += 1;
            }
        }

        assert_eq!(ran, 1);
        assert_eq!(provisioner.destroy_count(), 1);
        assert_eq!(platform.reruns(), vec![("10".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn error_cause_exits_one_and_reruns_every_pending_job() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(Driver::Gitlab, dir.path());
        let platform = Arc::new(MockPlatform::new(Driver::Gitlab));
        let provisioner = Arc::new(MockProvisioner::default());
        let seq = ShutdownSequence::new(&config, platform.clone(), provisioner.clone(), LifecycleState::new());

        let request = ShutdownRequest::new(ShutdownCause::error("runner process lost"), &config);
        let code = seq
            .execute(request, None, vec![job("1", "10"), job("2", "20"), job("3", "")])
            .await;

        assert_eq!(code, Some(1));
        let mut reruns = platform.reruns();
        reruns.sort();
        assert_eq!(
            reruns,
            vec![
                ("10".to_string(), "1".to_string()),
                ("20".to_string(), "2".to_string())
            ]
        );
        // no local process: nothing to unregister
        assert!(platform.unregistered().is_empty());
        // no destroy target declared
        assert_eq!(provisioner.destroy_count(), 0);
    }

    #[tokio::test]
    async fn no_retry_skips_reruns() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(Driver::Github, dir.path());
        config.no_retry = true;
        let platform = Arc::new(MockPlatform::new(Driver::Github));
        let seq = ShutdownSequence::new(
            &config,
            platform.clone(),
            Arc::new(MockProvisioner::default()),
            LifecycleState::new(),
        );

        let request = ShutdownRequest::new(ShutdownCause::reason("SIGTERM"), &config);
        assert_eq!(seq.execute(request, None, vec![job("1", "10")]).await, Some(0));
        assert!(platform.reruns().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_waits_for_delay() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(Driver::Gitlab, dir.path());
        config.tf_resource = Some("e30=".into());
        config.destroy_delay = Duration::from_secs(10);

        let provisioner = Arc::new(MockProvisioner::default());
        let seq = ShutdownSequence::new(
            &config,
            Arc::new(MockPlatform::new(Driver::Gitlab)),
            provisioner.clone(),
            LifecycleState::new(),
        );

        let started = tokio::time::Instant::now();
        let request = ShutdownRequest::new(ShutdownCause::reason("timeout:5"), &config);
        assert_eq!(seq.execute(request, None, Vec::new()).await, Some(0));

        assert_eq!(provisioner.destroy_count(), 1);
        let destroyed_at = provisioner.destroyed_at().unwrap();
        assert!(destroyed_at.duration_since(started) >= Duration::from_secs(10));
        assert_eq!(provisioner.destroyed_dirs(), vec![dir.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn cloud_request_skips_runner_steps() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = local_config(Driver::Github, dir.path());
        config.cloud = Some(cirun_model::CloudConfig::new(cirun_model::CloudProvider::Aws));
        let platform = Arc::new(MockPlatform::new(Driver::Github));
        let seq = ShutdownSequence::new(
            &config,
            platform.clone(),
            Arc::new(MockProvisioner::default()),
            LifecycleState::new(),
        );

        let request = ShutdownRequest::new(ShutdownCause::error("apply failed"), &config);
        assert_eq!(seq.execute(request, None, vec![job("1", "10")]).await, Some(1));
        assert!(platform.reruns().is_empty());
    }
}
