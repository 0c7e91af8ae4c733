use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use cirun_model::RunnerConfig;

use crate::{InfraError, Provisioner, TfState, template};

/// Oldest terraform release the templates are written for.
pub const MIN_VERSION: (u64, u64, u64) = (0, 14, 0);

/// [`Provisioner`] backed by the `terraform` CLI.
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
}

#[derive(Deserialize)]
struct VersionOutput {
    terraform_version: String,
}

impl Terraform {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, InfraError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).env("TF_IN_AUTOMATION", "1");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        debug!(target: "cirun.infra", command = args.join(" "), "terraform");
        let output = cmd
            .output()
            .await
            .map_err(|e| InfraError::Binary(format!("{}: {e}", self.binary.display())))?;

        if !output.status.success() {
            return Err(InfraError::Command {
                command: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provisioner for Terraform {
    async fn check_minimum_version(&self) -> Result<(), InfraError> {
        let raw = self.run(None, &["version", "-json"]).await?;
        let out: VersionOutput = serde_json::from_str(&raw)?;
        let found = parse_version(&out.terraform_version)
            .ok_or_else(|| InfraError::Binary(format!("unparsable version {raw}")))?;

        if found < MIN_VERSION {
            let (a, b, c) = MIN_VERSION;
            return Err(InfraError::VersionTooOld {
                found: out.terraform_version,
                required: format!("{a}.{b}.{c}"),
            });
        }
        Ok(())
    }

    fn render_local_destroy_template(&self, provider_version: &str) -> String {
        template::render_local_destroy(provider_version)
    }

    fn render_cloud_runner_template(&self, config: &RunnerConfig) -> Result<String, InfraError> {
        template::render_cloud_runner(config)
    }

    async fn init_workspace(&self, dir: &Path) -> Result<(), InfraError> {
        self.run(Some(dir), &["init", "-input=false", "-no-color"])
            .await?;
        Ok(())
    }

    async fn apply(&self, dir: &Path) -> Result<(), InfraError> {
        info!(target: "cirun.infra", dir = %dir.display(), "terraform apply");
        self.run(
            Some(dir),
            &["apply", "-auto-approve", "-input=false", "-no-color"],
        )
        .await?;
        Ok(())
    }

    async fn destroy(&self, dir: &Path) -> Result<String, InfraError> {
        info!(target: "cirun.infra", dir = %dir.display(), "terraform destroy");
        self.run(
            Some(dir),
            &["destroy", "-auto-approve", "-input=false", "-no-color"],
        )
        .await
    }

    async fn load_state(&self, path: &Path) -> Result<TfState, InfraError> {
        TfState::load(path).await
    }

    async fn save_state(&self, state: &TfState, path: &Path) -> Result<(), InfraError> {
        state.save(path).await
    }
}

/// `1.5.7`, `v1.5.7`, `1.6.0-beta1` -> (major, minor, patch)
fn parse_version(raw: &str) -> Option<(u64, u64, u64)> {
    let core = raw.trim().trim_start_matches('v');
    let core = core.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().unwrap_or(Ok(0)).ok()?;
    let patch = parts.next().unwrap_or(Ok(0)).ok()?;
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(parse_version("1.5.7"), Some((1, 5, 7)));
        assert_eq!(parse_version("v0.14.11"), Some((0, 14, 11)));
        assert_eq!(parse_version("1.6.0-beta1"), Some((1, 6, 0)));
        assert_eq!(parse_version("1"), Some((1, 0, 0)));
        assert_eq!(parse_version("dev"), None);
    }

    #[test]
    fn minimum_version_ordering() {
        assert!(parse_version("0.13.7").unwrap() < MIN_VERSION);
        assert!(parse_version("0.14.0").unwrap() >= MIN_VERSION);
        assert!(parse_version("1.0.0").unwrap() >= MIN_VERSION);
    }

    #[tokio::test]
    async fn missing_binary_reported() {
        let tf = Terraform::new().with_binary("/nonexistent/terraform");
        assert!(matches!(
            tf.check_minimum_version().await,
            Err(InfraError::Binary(_))
        ));
    }

    #[tokio::test]
    async fn state_roundtrip_through_provisioner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::STATE_FILE);
        let tf = Terraform::new();

        let state = TfState::default();
        tf.save_state(&state, &path).await.unwrap();
        assert_eq!(tf.load_state(&path).await.unwrap(), state);
    }
}
