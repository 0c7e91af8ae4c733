//! GitLab runners driven by `gitlab-runner run-single`.
use async_trait::async_trait;
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::warn;

use cirun_model::{CommandSpec, Driver, JobEvent, JobStatus, RunnerConfig, RunnerInfo};

use crate::{
    CiPlatform, PlatformError, RepoRef,
    http::{ApiClient, Auth},
    install::download_binary,
};

const RUNNER_BINARY: &str = "gitlab-runner";
const DOCKER_IMAGE: &str = "ubuntu:22.04";

pub struct Gitlab {
    api: ApiClient,
    repo: RepoRef,
}

#[derive(Deserialize)]
struct Project {
    id: u64,
}

#[derive(Deserialize)]
struct GlRunner {
    id: u64,
    #[serde(default)]
    description: String,
    online: Option<bool>,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct GlRunnerDetail {
    #[serde(default)]
    tag_list: Vec<String>,
}

#[derive(Deserialize)]
struct CreatedRunner {
    token: String,
}

#[derive(Deserialize)]
struct GlJob {
    pipeline: GlPipeline,
}

#[derive(Deserialize)]
struct GlPipeline {
    id: u64,
}

/// One JSON line of `gitlab-runner --log-format json`.
#[derive(Deserialize)]
struct LogLine {
    #[serde(default)]
    msg: String,
    job: Option<u64>,
    time: Option<String>,
}

impl Gitlab {
    pub fn new(repo: RepoRef, token: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            api: ApiClient::new(
                format!("{}/api/v4", repo.origin),
                Auth::PrivateToken(token.to_string()),
            )?,
            repo,
        })
    }

    fn project_path(&self) -> String {
        format!("/projects/{}", self.repo.encoded_path())
    }

    async fn project_runners(&self) -> Result<Vec<GlRunner>, PlatformError> {
        self.api
            .get_json(&format!("{}/runners?per_page=100", self.project_path()))
            .await
    }

    async fn job_pipeline(&self, job_id: u64) -> Result<u64, PlatformError> {
        let job: GlJob = self
            .api
            .get_json(&format!("{}/jobs/{job_id}", self.project_path()))
            .await?;
        Ok(job.pipeline.id)
    }
}

#[async_trait]
impl CiPlatform for Gitlab {
    fn driver(&self) -> Driver {
        Driver::Gitlab
    }

    async fn repo_token_check(&self) -> Result<(), PlatformError> {
        let _: Project = self.api.get_json(&self.project_path()).await?;
        Ok(())
    }

    async fn list_runners(&self) -> Result<Vec<RunnerInfo>, PlatformError> {
        let mut out = Vec::new();
        for runner in self.project_runners().await? {
            let detail: GlRunnerDetail = self
                .api
                .get_json(&format!("/runners/{}", runner.id))
                .await?;
            let running: Vec<serde_json::Value> = self
                .api
                .get_json(&format!("/runners/{}/jobs?status=running", runner.id))
                .await?;
            out.push(RunnerInfo {
                id: runner.id.to_string(),
                online: runner.online.unwrap_or(runner.status == "online"),
                name: runner.description,
                labels: detail.tag_list,
                busy: !running.is_empty(),
            });
        }
        Ok(out)
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), PlatformError> {
        let runner = self
            .project_runners()
            .await?
            .into_iter()
            .find(|r| r.description == name)
            .ok_or_else(|| PlatformError::RunnerNotFound(name.to_string()))?;
        self.api.delete(&format!("/runners/{}", runner.id)).await
    }

    async fn rerun_pipeline_job(
        &self,
        pipeline_id: &str,
        _job_id: &str,
    ) -> Result<(), PlatformError> {
        self.api
            .post(&format!("{}/pipelines/{pipeline_id}/retry", self.project_path()))
            .await
    }

    async fn prepare_runner(&self, config: &RunnerConfig) -> Result<CommandSpec, PlatformError> {
        let dir = &config.workdir;
        let binary = dir.join(RUNNER_BINARY);
        if !binary.exists() {
            let url = format!(
                "https://gitlab-runner-downloads.s3.amazonaws.com/latest/binaries/gitlab-runner-{}-{}",
                std::env::consts::OS,
                binary_arch()
            );
            download_binary(self.api.http(), &url, &binary).await?;
        }

        let project: Project = self.api.get_json(&self.project_path()).await?;
        let created: CreatedRunner = self
            .api
            .post_json(
                "/user/runners",
                &serde_json::json!({
                    "runner_type": "project_type",
                    "project_id": project.id,
                    "description": config.name,
                    "tag_list": config.labels.joined(),
                    "run_untagged": false,
                    "locked": true,
                }),
            )
            .await?;

        let mut spec = CommandSpec::new(binary.to_string_lossy())
            .args(["--log-format", "json", "run-single"])
            .arg("--url")
            .arg(&self.repo.origin)
            .env("CI_SERVER_TOKEN", created.token)
            .arg("--name")
            .arg(&config.name)
            .arg("--builds-dir")
            .arg(dir.join("builds").to_string_lossy())
            .arg("--cache-dir")
            .arg(dir.join("cache").to_string_lossy())
            .cwd(dir);

        if config.docker_volumes.is_empty() {
            spec = spec.args(["--executor", "shell"]);
        } else {
            spec = spec.args(["--executor", "docker", "--docker-image", DOCKER_IMAGE]);
            for volume in &config.docker_volumes {
                spec = spec.arg("--docker-volumes").arg(volume);
            }
        }
        if !config.idle_timeout.is_zero() {
            spec = spec
                .arg("--wait-timeout")
                .arg(config.idle_timeout.as_secs().to_string());
        }
        if config.single {
            spec = spec.args(["--max-builds", "1"]);
        }
        Ok(spec)
    }

    async fn parse_log_chunk(
        &self,
        raw: &[u8],
        _runner_name: &str,
    ) -> Result<Vec<JobEvent>, PlatformError> {
        let text = String::from_utf8_lossy(raw);
        let mut events = Vec::new();

        for line in text.lines() {
            let Some((status, job, date)) = parse_line(line) else {
                continue;
            };
            match status {
                JobStatus::JobStarted => {
                    let pipeline = match self.job_pipeline(job).await {
                        Ok(id) => id.to_string(),
                        Err(e) => {
                            warn!(job, "pipeline lookup failed: {e}");
                            String::new()
                        }
                    };
                    events.push(JobEvent::started(job.to_string(), pipeline, date));
                }
                JobStatus::JobEnded => events.push(JobEvent::ended(date)),
            }
        }
        Ok(events)
    }
}

fn parse_line(line: &str) -> Option<(JobStatus, u64, OffsetDateTime)> {
    if !line.contains("\"job\"") {
        return None;
    }
    let parsed: LogLine = serde_json::from_str(line.trim()).ok()?;
    let job = parsed.job?;

    let status = if parsed.msg.ends_with("received") {
        JobStatus::JobStarted
    } else if parsed.msg == "Job succeeded" || parsed.msg.starts_with("Job failed") {
        JobStatus::JobEnded
    } else {
        return None;
    };

    let date = parsed
        .time
        .and_then(|t| OffsetDateTime::parse(&t, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc);
    Some((status, job, date))
}

fn binary_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86" => "386",
        _ => "amd64",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_job_is_start() {
        let line = r#"{"job":4242,"level":"info","msg":"Checking for jobs... received","time":"2023-01-05T10:20:40Z"}"#;
        let (status, job, date) = parse_line(line).unwrap();
        assert_eq!(status, JobStatus::JobStarted);
        assert_eq!(job, 4242);
        assert_eq!(date.minute(), 20);
    }

    #[test]
    fn finished_job_is_end() {
        let ok = r#"{"job":4242,"msg":"Job succeeded","time":"2023-01-05T10:30:00Z"}"#;
        let failed = r#"{"job":4242,"msg":"Job failed: exit code 1"}"#;
        assert_eq!(parse_line(ok).unwrap().0, JobStatus::JobEnded);
        assert_eq!(parse_line(failed).unwrap().0, JobStatus::JobEnded);
    }

    #[test]
    fn other_lines_ignored() {
        assert!(parse_line(r#"{"msg":"Runtime platform"}"#).is_none());
        assert!(parse_line(r#"{"job":1,"msg":"Appending trace"}"#).is_none());
        assert!(parse_line("plain text mentioning \"job\"").is_none());
    }
}
