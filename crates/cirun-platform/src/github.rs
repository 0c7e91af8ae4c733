//! GitHub Actions self-hosted runners.
//!
//! The agent is the official `actions/runner` release, registered with
//! `config.sh` and started with `run.sh`. Its console output carries no job
//! ids, so a started job is resolved through the API by runner name.
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use time::{OffsetDateTime, PrimitiveDateTime, format_description::FormatItem};
use tracing::{debug, warn};

use cirun_model::{CommandSpec, Driver, JobEvent, JobStatus, RunnerConfig, RunnerInfo};

use crate::{
    CiPlatform, PlatformError, RepoRef,
    http::{ApiClient, Auth},
    install::{download_and_extract, run_setup},
};

const API: &str = "https://api.github.com";
const RUN_COMPLETION_POLLS: u32 = 60;
const RUN_COMPLETION_INTERVAL: Duration = Duration::from_secs(5);

pub struct Github {
    api: ApiClient,
    repo: RepoRef,
    token: String,
}

#[derive(Deserialize)]
struct RunnerList {
    runners: Vec<GhRunner>,
}

#[derive(Deserialize)]
struct GhRunner {
    id: u64,
    name: String,
    status: String,
    busy: bool,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Deserialize)]
struct RegistrationToken {
    token: String,
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

#[derive(Deserialize)]
struct WorkflowRuns {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct WorkflowRun {
    id: u64,
    status: String,
}

#[derive(Deserialize)]
struct Jobs {
    jobs: Vec<Job>,
}

#[derive(Deserialize)]
struct Job {
    id: u64,
    run_id: u64,
    status: String,
    runner_name: Option<String>,
}

impl Github {
    pub fn new(repo: RepoRef, token: &str) -> Result<Self, PlatformError> {
        let base = if repo.host == "github.com" {
            API.to_string()
        } else {
            // GitHub Enterprise Server
            format!("{}/api/v3", repo.origin)
        };
        Ok(Self {
            api: ApiClient::new(base, Auth::Token(token.to_string()))?,
            repo,
            token: token.to_string(),
        })
    }

    fn repo_path(&self) -> String {
        format!("/repos/{}", self.repo.path)
    }

    async fn runner_job(&self, runner_name: &str) -> Result<Option<(String, String)>, PlatformError> {
        let runs: WorkflowRuns = self
            .api
            .get_json(&format!(
                "{}/actions/runs?status=in_progress&per_page=100",
                self.repo_path()
            ))
            .await?;

        for run in runs.workflow_runs {
            let jobs: Jobs = self
                .api
                .get_json(&format!("{}/actions/runs/{}/jobs", self.repo_path(), run.id))
                .await?;
            if let Some(job) = jobs
                .jobs
                .into_iter()
                .find(|j| j.status == "in_progress" && j.runner_name.as_deref() == Some(runner_name))
            {
                return Ok(Some((job.id.to_string(), job.run_id.to_string())));
            }
        }
        Ok(None)
    }

    async fn install(&self, config: &RunnerConfig) -> Result<(), PlatformError> {
        let release: Release = self
            .api
            .get_json(&format!("{API}/repos/actions/runner/releases/latest"))
            .await?;
        let version = release.tag_name.trim_start_matches('v');
        let url = format!(
            "https://github.com/actions/runner/releases/download/v{version}/actions-runner-{}-{}-{version}.tar.gz",
            runner_os(),
            runner_arch()
        );
        download_and_extract(self.api.http(), &url, &config.workdir).await
    }
}

#[async_trait]
impl CiPlatform for Github {
    fn driver(&self) -> Driver {
        Driver::Github
    }

    async fn repo_token_check(&self) -> Result<(), PlatformError> {
        let _: serde_json::Value = self.api.get_json(&self.repo_path()).await?;
        Ok(())
    }

    async fn list_runners(&self) -> Result<Vec<RunnerInfo>, PlatformError> {
        let list: RunnerList = self
            .api
            .get_json(&format!("{}/actions/runners?per_page=100", self.repo_path()))
            .await?;
        Ok(list
            .runners
            .into_iter()
            .map(|r| RunnerInfo {
                id: r.id.to_string(),
                name: r.name,
                labels: r.labels.into_iter().map(|l| l.name).collect(),
                online: r.status == "online",
                busy: r.busy,
            })
            .collect())
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), PlatformError> {
        let runners = self.list_runners().await?;
        let runner = self
            .find_runner_by_name(name, &runners)
            .ok_or_else(|| PlatformError::RunnerNotFound(name.to_string()))?;
        self.api
            .delete(&format!("{}/actions/runners/{}", self.repo_path(), runner.id))
            .await
    }

    async fn rerun_pipeline_job(
        &self,
        pipeline_id: &str,
        job_id: &str,
    ) -> Result<(), PlatformError> {
        let run_path = format!("{}/actions/runs/{pipeline_id}", self.repo_path());
        debug!(pipeline_id, job_id, "cancelling workflow run before rerun");
        if let Err(e) = self.api.post(&format!("{run_path}/cancel")).await {
            // already finished runs reject cancellation
            debug!(pipeline_id, "cancel rejected: {e}");
        }

        for _ in 0..RUN_COMPLETION_POLLS {
            let run: WorkflowRun = self.api.get_json(&run_path).await?;
            if run.status == "completed" {
                return self.api.post(&format!("{run_path}/rerun")).await;
            }
            tokio::time::sleep(RUN_COMPLETION_INTERVAL).await;
        }
        Err(PlatformError::InvalidResponse(format!(
            "workflow run {pipeline_id} did not complete after cancel"
        )))
    }

    async fn prepare_runner(&self, config: &RunnerConfig) -> Result<CommandSpec, PlatformError> {
        let dir = &config.workdir;
        if !dir.join("config.sh").exists() {
            self.install(config).await?;
        }

        let registration: RegistrationToken = self
            .api
            .post_json(
                &format!("{}/actions/runners/registration-token", self.repo_path()),
                &serde_json::json!({}),
            )
            .await?;

        let mut cmd = tokio::process::Command::new(dir.join("config.sh"));
        cmd.current_dir(dir)
            .env("RUNNER_ALLOW_RUNASROOT", "1")
            .args(["--unattended", "--replace", "--work", "_work"])
            .arg("--url")
            .arg(format!("{}/{}", self.repo.origin, self.repo.path))
            .arg("--token")
            .arg(&registration.token)
            .arg("--name")
            .arg(&config.name)
            .arg("--labels")
            .arg(config.labels.joined());
        if config.single {
            cmd.arg("--ephemeral");
        }
        run_setup(cmd, "config.sh").await?;

        Ok(CommandSpec::new(dir.join("run.sh").to_string_lossy())
            .cwd(dir)
            .env("RUNNER_ALLOW_RUNASROOT", "1"))
    }

    async fn parse_log_chunk(
        &self,
        raw: &[u8],
        runner_name: &str,
    ) -> Result<Vec<JobEvent>, PlatformError> {
        let text = String::from_utf8_lossy(raw);
        let mut events = Vec::new();

        for line in text.lines() {
            let Some((status, date)) = parse_line(line) else {
                continue;
            };
            match status {
                JobStatus::JobStarted => {
                    let (job, run) = match self.runner_job(runner_name).await {
                        Ok(Some(ids)) => ids,
                        Ok(None) => {
                            warn!(runner_name, "started job not found in in-progress runs");
                            (String::new(), String::new())
                        }
                        Err(e) => {
                            warn!(runner_name, "job lookup failed: {e}");
                            (String::new(), String::new())
                        }
                    };
                    events.push(JobEvent::started(job, run, date));
                }
                JobStatus::JobEnded => events.push(JobEvent::ended(date)),
            }
        }
        Ok(events)
    }
}

impl std::fmt::Debug for Github {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Github")
            .field("repo", &self.repo)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .finish()
    }
}

const LINE_DATE: &[FormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]Z");

/// `2023-01-05 10:20:40Z: Running job: build`
/// `2023-01-05 10:25:00Z: Job build completed with result: Succeeded`
fn parse_line(line: &str) -> Option<(JobStatus, OffsetDateTime)> {
    let (stamp, message) = match line.split_once("Z: ") {
        Some((stamp, message)) => (Some(stamp), message),
        None => (None, line),
    };

    let status = if message.starts_with("Running job:") {
        JobStatus::JobStarted
    } else if message.starts_with("Job ") && message.contains("completed with result:") {
        JobStatus::JobEnded
    } else {
        return None;
    };

    let date = stamp
        .and_then(|s| PrimitiveDateTime::parse(&format!("{s}Z"), LINE_DATE).ok())
        .map(PrimitiveDateTime::assume_utc)
        .unwrap_or_else(OffsetDateTime::now_utc);
    Some((status, date))
}

fn runner_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "osx",
        "windows" => "win",
        _ => "linux",
    }
}

fn runner_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => "x64",
    }
}
