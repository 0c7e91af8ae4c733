//! Recording doubles of the platform and provisioner.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use time::OffsetDateTime;
use tokio::{sync::Notify, time::Instant};

use cirun_infra::{InfraError, Provisioner, TfState};
use cirun_model::{CommandSpec, Driver, JobEvent, RunnerConfig, RunnerInfo, RunnerLabels};
use cirun_platform::{CiPlatform, PlatformError};

pub fn local_config(driver: Driver, workdir: &Path) -> RunnerConfig {
    RunnerConfig {
        name: "test-runner".into(),
        labels: RunnerLabels::parse("cml"),
        driver,
        repo: "https://example.com/org/repo".into(),
        token: "secret".into(),
        idle_timeout: Duration::ZERO,
        single: false,
        reuse: false,
        reuse_idle: false,
        no_retry: false,
        workdir: workdir.to_path_buf(),
        docker_volumes: Vec::new(),
        cloud: None,
        tf_resource: None,
        tpi_version: ">= 0.9.10".into(),
        runner_version: "latest".into(),
        destroy_delay: Duration::ZERO,
    }
}

pub fn encoded_resource() -> String {
    STANDARD.encode(
        r#"{"mode":"managed","type":"iterative_cml_runner","name":"runner","instances":[{"attributes":{"id":"i-1"}}]}"#,
    )
}

#[derive(Default)]
struct PlatformCalls {
    prepared: usize,
    unregistered: Vec<String>,
    reruns: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserMode {
    Lines,
    Stalled,
    Panicking,
}

/// Understands three output lines: `started <job> <pipeline>`, `ended` and `sync`.
pub struct MockPlatform {
    driver: Driver,
    runners: Vec<RunnerInfo>,
    command: Option<CommandSpec>,
    fail_unregister: bool,
    hold_prepare: bool,
    parser: ParserMode,
    calls: Mutex<PlatformCalls>,
    synced: Arc<Notify>,
    parsing: Arc<Notify>,
    preparing: Arc<Notify>,
}

impl MockPlatform {
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            runners: Vec::new(),
            command: None,
            fail_unregister: false,
            hold_prepare: false,
            parser: ParserMode::Lines,
            calls: Mutex::new(PlatformCalls::default()),
            synced: Arc::new(Notify::new()),
            parsing: Arc::new(Notify::new()),
            preparing: Arc::new(Notify::new()),
        }
    }

    pub fn with_runners(mut self, runners: Vec<RunnerInfo>) -> Self {
        self.runners = runners;
        self
    }

    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = Some(command);
        self
    }

    pub fn failing_unregister(mut self) -> Self {
        self.fail_unregister = true;
        self
    }

    /// `prepare_runner` never returns.
    pub fn holding_prepare(mut self) -> Self {
        self.hold_prepare = true;
        self
    }

    /// `parse_log_chunk` never returns.
    pub fn stalled_parser(mut self) -> Self {
        self.parser = ParserMode::Stalled;
        self
    }

    pub fn panicking_parser(mut self) -> Self {
        self.parser = ParserMode::Panicking;
        self
    }

    /// Notified when a `sync` line is parsed. Parsing is sequential, so every
    /// job event printed before it has already been delivered.
    pub fn synced(&self) -> Arc<Notify> {
        Arc::clone(&self.synced)
    }

    /// Notified when `parse_log_chunk` is entered.
    pub fn parsing(&self) -> Arc<Notify> {
        Arc::clone(&self.parsing)
    }

    /// Notified when `prepare_runner` is entered.
    pub fn preparing(&self) -> Arc<Notify> {
        Arc::clone(&self.preparing)
    }

    pub fn prepared(&self) -> usize {
        self.calls.lock().unwrap().prepared
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.calls.lock().unwrap().unregistered.clone()
    }

    pub fn reruns(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().reruns.clone()
    }
}

#[async_trait]
impl CiPlatform for MockPlatform {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn repo_token_check(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn list_runners(&self) -> Result<Vec<RunnerInfo>, PlatformError> {
        Ok(self.runners.clone())
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().unregistered.push(name.to_string());
        if self.fail_unregister {
            return Err(PlatformError::RunnerNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn rerun_pipeline_job(&self, pipeline_id: &str, job_id: &str) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .reruns
            .push((pipeline_id.to_string(), job_id.to_string()));
        Ok(())
    }

    async fn prepare_runner(&self, _config: &RunnerConfig) -> Result<CommandSpec, PlatformError> {
        self.calls.lock().unwrap().prepared += 1;
        self.preparing.notify_one();
        if self.hold_prepare {
            std::future::pending::<()>().await;
        }
        self.command
            .clone()
            .ok_or_else(|| PlatformError::Install("no runner command".into()))
    }

    async fn parse_log_chunk(&self, raw: &[u8], _runner_name: &str) -> Result<Vec<JobEvent>, PlatformError> {
        self.parsing.notify_one();
        match self.parser {
            ParserMode::Lines => {}
            ParserMode::Stalled => std::future::pending::<()>().await,
            ParserMode::Panicking => panic!("unparseable runner output"),
        }

        let now = OffsetDateTime::now_utc();
        let mut events = Vec::new();
        for line in String::from_utf8_lossy(raw).lines() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("started") => {
                    let job = parts.next().unwrap_or_default();
                    let pipeline = parts.next().unwrap_or_default();
                    events.push(JobEvent::started(job, pipeline, now));
                }
                Some("ended") => events.push(JobEvent::ended(now)),
                Some("sync") => self.synced.notify_one(),
                _ => {}
            }
        }
        Ok(events)
    }
}

#[derive(Default)]
struct ProvisionerCalls {
    applied: usize,
    destroyed: Vec<(PathBuf, Instant)>,
    saved: Option<TfState>,
}

#[derive(Default)]
pub struct MockProvisioner {
    calls: Mutex<ProvisionerCalls>,
}

impl MockProvisioner {
    pub fn applied(&self) -> usize {
        self.calls.lock().unwrap().applied
    }

    pub fn destroy_count(&self) -> usize {
        self.calls.lock().unwrap().destroyed.len()
    }

    pub fn destroyed_dirs(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .destroyed
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn destroyed_at(&self) -> Option<Instant> {
        self.calls.lock().unwrap().destroyed.first().map(|(_, at)| *at)
    }

    pub fn saved_state(&self) -> Option<TfState> {
        self.calls.lock().unwrap().saved.clone()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn check_minimum_version(&self) -> Result<(), InfraError> {
        Ok(())
    }

    fn render_local_destroy_template(&self, provider_version: &str) -> String {
        format!("# provider {provider_version}\n")
    }

    fn render_cloud_runner_template(&self, config: &RunnerConfig) -> Result<String, InfraError> {
        Ok(format!("# runner {}\n", config.name))
    }

    async fn init_workspace(&self, _dir: &Path) -> Result<(), InfraError> {
        Ok(())
    }

    async fn apply(&self, _dir: &Path) -> Result<(), InfraError> {
        self.calls.lock().unwrap().applied += 1;
        Ok(())
    }

    async fn destroy(&self, dir: &Path) -> Result<String, InfraError> {
        self.calls
            .lock()
            .unwrap()
            .destroyed
            .push((dir.to_path_buf(), Instant::now()));
        Ok("Destroy complete!".into())
    }

    async fn load_state(&self, _path: &Path) -> Result<TfState, InfraError> {
        Ok(TfState::default())
    }

    async fn save_state(&self, state: &TfState, _path: &Path) -> Result<(), InfraError> {
        self.calls.lock().unwrap().saved = Some(state.clone());
        Ok(())
    }
}
