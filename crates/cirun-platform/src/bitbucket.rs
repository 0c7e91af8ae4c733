//! Bitbucket Pipelines repository runners (linux-shell runtime).
use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use cirun_model::{CommandSpec, Driver, JobEvent, RunnerConfig, RunnerInfo};

use crate::{
    CiPlatform, PlatformError, RepoRef,
    http::{ApiClient, Auth},
    install::download_and_extract,
};

const API: &str = "https://api.bitbucket.org/2.0";
const RUNNER_ARCHIVE: &str = "https://product-downloads.atlassian.com/software/bitbucket/pipelines/atlassian-bitbucket-pipelines-runner.tar.gz";

pub struct Bitbucket {
    api: ApiClient,
    repo: RepoRef,
}

#[derive(Deserialize)]
struct Page<T> {
    values: Vec<T>,
}

#[derive(Deserialize)]
struct BbRunner {
    uuid: String,
    name: String,
    #[serde(default)]
    labels: Vec<String>,
    state: Option<BbState>,
}

#[derive(Deserialize)]
struct BbState {
    status: String,
}

#[derive(Deserialize)]
struct CreatedRunner {
    uuid: String,
    oauth_client: OauthClient,
}

#[derive(Deserialize)]
struct OauthClient {
    id: String,
    secret: String,
}

#[derive(Deserialize)]
struct Repository {
    uuid: String,
    workspace: Workspace,
}

#[derive(Deserialize)]
struct Workspace {
    uuid: String,
}

impl Bitbucket {
    pub fn new(repo: RepoRef, token: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            api: ApiClient::new(API, Auth::Bearer(token.to_string()))?,
            repo,
        })
    }

    fn repo_path(&self) -> String {
        format!("/repositories/{}", self.repo.path)
    }

    async fn runners(&self) -> Result<Vec<BbRunner>, PlatformError> {
        let page: Page<BbRunner> = self
            .api
            .get_json(&format!("{}/pipelines-config/runners", self.repo_path()))
            .await?;
        Ok(page.values)
    }
}

#[async_trait]
impl CiPlatform for Bitbucket {
    fn driver(&self) -> Driver {
        Driver::Bitbucket
    }

    async fn repo_token_check(&self) -> Result<(), PlatformError> {
        let _: Repository = self.api.get_json(&self.repo_path()).await?;
        Ok(())
    }

    async fn list_runners(&self) -> Result<Vec<RunnerInfo>, PlatformError> {
        // busy state is not exposed by the API
        Ok(self
            .runners()
            .await?
            .into_iter()
            .map(|r| RunnerInfo {
                online: r.state.is_some_and(|s| s.status == "ONLINE"),
                id: r.uuid,
                name: r.name,
                labels: r.labels,
                busy: false,
            })
            .collect())
    }

    async fn unregister_runner(&self, name: &str) -> Result<(), PlatformError> {
        let runner = self
            .runners()
            .await?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| PlatformError::RunnerNotFound(name.to_string()))?;
        self.api
            .delete(&format!(
                "{}/pipelines-config/runners/{}",
                self.repo_path(),
                runner.uuid
            ))
            .await
    }

    async fn rerun_pipeline_job(
        &self,
        _pipeline_id: &str,
        _job_id: &str,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("pipeline rerun"))
    }

    async fn prepare_runner(&self, config: &RunnerConfig) -> Result<CommandSpec, PlatformError> {
        let dir = &config.workdir;
        let start = dir.join("bin").join("start.sh");
        if !start.exists() {
            download_and_extract(self.api.http(), RUNNER_ARCHIVE, dir).await?;
        }

        let repo: Repository = self.api.get_json(&self.repo_path()).await?;
        let mut labels = vec!["self.hosted".to_string(), "linux.shell".to_string()];
        labels.extend(config.labels.iter().map(str::to_string));
        let created: CreatedRunner = self
            .api
            .post_json(
                &format!("{}/pipelines-config/runners", self.repo_path()),
                &serde_json::json!({ "name": config.name, "labels": labels }),
            )
            .await?;

        Ok(CommandSpec::new(start.to_string_lossy())
            .cwd(dir.join("bin"))
            .arg("--accountUuid")
            .arg(repo.workspace.uuid)
            .arg("--repositoryUuid")
            .arg(repo.uuid)
            .arg("--runnerUuid")
            .arg(created.uuid)
            .arg("--OAuthClientId")
            .arg(created.oauth_client.id)
            .arg("--OAuthClientSecret")
            .arg(created.oauth_client.secret)
            .args(["--runtime", "linux-shell"])
            .arg("--workingDirectory")
            .arg(dir.join("work").to_string_lossy()))
    }

    async fn parse_log_chunk(
        &self,
        raw: &[u8],
        _runner_name: &str,
    ) -> Result<Vec<JobEvent>, PlatformError> {
        let text = String::from_utf8_lossy(raw);
        Ok(text.lines().filter_map(parse_line).collect())
    }
}

/// `Getting step StepId{accountUuid={..}, repositoryUuid={..}, pipelineUuid={P}, stepUuid={S}}`
/// `Completing step with result Result{status=PASSED, error=None}`
fn parse_line(line: &str) -> Option<JobEvent> {
    let now = OffsetDateTime::now_utc();
    if line.contains("Getting step StepId{") {
        let pipeline = braced_value(line, "pipelineUuid=")?;
        let step = braced_value(line, "stepUuid=")?;
        return Some(JobEvent::started(step, pipeline, now));
    }
    if line.contains("Completing step with result") {
        return Some(JobEvent::ended(now));
    }
    None
}

fn braced_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].strip_prefix('{')?;
    let end = rest.find('}')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirun_model::JobStatus;

    #[test]
    fn getting_step_is_start() {
        let line = "[2023-01-05 10:20:40,123] Getting step StepId{accountUuid={a-1}, repositoryUuid={r-2}, pipelineUuid={p-3}, stepUuid={s-4}}";
        let ev = parse_line(line).unwrap();
        assert_eq!(ev.status, JobStatus::JobStarted);
        assert_eq!(ev.job_id.as_deref(), Some("s-4"));
        assert_eq!(ev.pipeline_id.as_deref(), Some("p-3"));
    }

    #[test]
    fn completing_step_is_end() {
        let ev = parse_line("[..] Completing step with result Result{status=PASSED, error=None}.")
            .unwrap();
        assert_eq!(ev.status, JobStatus::JobEnded);
    }

    #[test]
    fn malformed_step_line_ignored() {
        assert!(parse_line("Getting step StepId{accountUuid={a}}").is_none());
        assert!(parse_line("Updating runner status to ONLINE").is_none());
    }
}
