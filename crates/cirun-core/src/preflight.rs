use tracing::{info, warn};

use cirun_model::{ConfigError, Driver, RunnerConfig};
use cirun_platform::CiPlatform;

use crate::CoreError;

/// Outcome of the checks run before anything is provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    /// Nothing suitable exists; launch a new runner.
    Launch,
    /// An existing runner can be reused; exit successfully with this message.
    Reuse(String),
}

/// Validate the config against the platform's current runners.
pub async fn preflight(config: &RunnerConfig, platform: &dyn CiPlatform) -> Result<Preflight, CoreError> {
    config.validate()?;
    platform.repo_token_check().await?;

    if !config.docker_volumes.is_empty() && !config.driver.supports_docker_volumes() {
        warn!("Parameters --docker-volumes is only supported in gitlab");
    }

    let runners = platform.list_runners().await?;

    if platform.find_runner_by_name(&config.name, &runners).is_some() {
        if !config.reuse {
            return Err(ConfigError::NameInUse(config.name.clone()).into());
        }
        return Ok(Preflight::Reuse(format!(
            "Reusing existing runner named {}...",
            config.name
        )));
    }

    if config.reuse
        && platform
            .find_runners_by_labels(&config.labels, &runners)
            .iter()
            .any(|r| r.online)
    {
        return Ok(Preflight::Reuse(format!(
            "Reusing existing online runners with the {} labels...",
            config.labels
        )));
    }

    if config.reuse_idle {
        if !config.driver.supports_reuse_idle() {
            return Err(ConfigError::ReuseIdleUnsupported(config.driver.to_string()).into());
        }
        info!(labels = %config.labels, "Checking for existing idle runner...");
        if let Some(runner) = platform
            .find_runners_by_labels(&config.labels, &runners)
            .into_iter()
            .find(|r| r.is_idle())
        {
            return Ok(Preflight::Reuse(format!(
                "Found matching idle runner {}",
                runner.name
            )));
        }
    }

    if config.driver == Driver::Github {
        warn!(
            "Github Actions timeout has been updated from 72h to 35 days. Update your workflow accordingly to be able to restart it automatically."
        );
    }

    Ok(Preflight::Launch)
}
