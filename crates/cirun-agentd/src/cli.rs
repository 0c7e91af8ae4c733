use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use clap::Parser;
use tracing::warn;

use cirun_model::{CloudConfig, CloudProvider, ConfigError, Driver, RunnerConfig, RunnerLabels};
use cirun_observe::{LoggerFormat, LoggerLevel};

/// Launch and supervise a self-hosted CI runner.
#[derive(Debug, Parser)]
#[command(name = "cirun-agentd", version)]
pub struct Args {
    /// CI platform; inferred from the repository host when omitted
    #[arg(long, env = "CIRUN_RUNNER_DRIVER")]
    pub driver: Option<Driver>,

    /// Repository URL to register the runner against
    #[arg(long, env = "CIRUN_RUNNER_REPO")]
    pub repo: String,

    /// Personal access token
    #[arg(long, env = "CIRUN_RUNNER_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Comma-separated runner labels
    #[arg(long, env = "CIRUN_RUNNER_LABELS", default_value = "cml")]
    pub labels: String,

    /// Inactivity before shutdown: seconds, a duration like 5m, or "never"
    #[arg(long, env = "CIRUN_RUNNER_IDLE_TIMEOUT", default_value = "5m", value_parser = parse_idle_timeout)]
    pub idle_timeout: Duration,

    /// Runner name displayed on the CI platform
    #[arg(long, env = "CIRUN_RUNNER_NAME")]
    pub name: Option<String>,

    /// Do not restart jobs interrupted by the shutdown
    #[arg(long, env = "CIRUN_RUNNER_NO_RETRY")]
    pub no_retry: bool,

    /// Exit after running a single job
    #[arg(long, env = "CIRUN_RUNNER_SINGLE")]
    pub single: bool,

    /// Do not launch if a runner with the same name or labels is online
    #[arg(long, env = "CIRUN_RUNNER_REUSE")]
    pub reuse: bool,

    /// Only launch if no matching runner is online and idle
    #[arg(long, env = "CIRUN_RUNNER_REUSE_IDLE")]
    pub reuse_idle: bool,

    /// Runner working directory [default: ~/.cirun/<name>]
    #[arg(long, env = "CIRUN_RUNNER_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Docker volumes mounted into jobs (GitLab only)
    #[arg(long, env = "CIRUN_RUNNER_DOCKER_VOLUMES", value_delimiter = ',')]
    pub docker_volumes: Vec<String>,

    /// Provision the runner on this cloud instead of locally
    #[arg(long, env = "CIRUN_RUNNER_CLOUD")]
    pub cloud: Option<CloudProvider>,

    #[arg(long, env = "CIRUN_RUNNER_CLOUD_REGION", default_value = "us-west")]
    pub cloud_region: String,

    /// Instance type
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_TYPE")]
    pub cloud_type: Option<String>,

    #[arg(long, env = "CIRUN_RUNNER_CLOUD_PERMISSION_SET", default_value = "")]
    pub cloud_permission_set: String,

    /// Instance tags as key=value; repeatable
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_METADATA", value_parser = parse_key_value)]
    pub cloud_metadata: Vec<(String, String)>,

    /// GPU type; "nogpu" for none
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_GPU")]
    pub cloud_gpu: Option<String>,

    /// Disk size in GB
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_HDD_SIZE")]
    pub cloud_hdd_size: Option<u32>,

    /// Custom private SSH key
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_SSH_PRIVATE", hide_env_values = true)]
    pub cloud_ssh_private: Option<String>,

    /// Request a spot instance
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_SPOT")]
    pub cloud_spot: bool,

    /// Maximum spot bid in USD; -1 uses the market price
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_SPOT_PRICE", default_value_t = -1.0, allow_negative_numbers = true)]
    pub cloud_spot_price: f64,

    /// Base64-encoded script run when the instance starts
    #[arg(long, env = "CIRUN_RUNNER_CLOUD_STARTUP_SCRIPT")]
    pub cloud_startup_script: Option<String>,

    #[arg(long, env = "CIRUN_RUNNER_CLOUD_AWS_SECURITY_GROUP", default_value = "")]
    pub cloud_aws_security_group: String,

    #[arg(long, env = "CIRUN_RUNNER_CLOUD_AWS_SUBNET", default_value = "")]
    pub cloud_aws_subnet: String,

    #[arg(long, env = "CIRUN_RUNNER_TPI_VERSION", default_value = ">= 0.9.10", hide = true)]
    pub tpi_version: String,

    #[arg(long, env = "CIRUN_RUNNER_RUNNER_VERSION", default_value = "latest", hide = true)]
    pub runner_version: String,

    /// Base64-encoded JSON of the resource this runner lives on
    #[arg(long, env = "CIRUN_RUNNER_TF_RESOURCE", hide = true)]
    pub tf_resource: Option<String>,

    /// Seconds to wait before destroying infrastructure
    #[arg(long, env = "CIRUN_RUNNER_DESTROY_DELAY", default_value_t = 10, hide = true)]
    pub destroy_delay: u64,

    /// text, json or journald
    #[arg(long, env = "CIRUN_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Level or EnvFilter directive
    #[arg(long, env = "CIRUN_LOG_LEVEL", default_value = "info")]
    pub log_level: LoggerLevel,
}

impl Args {
    pub fn into_config(self) -> Result<RunnerConfig, ConfigError> {
        let driver = match self.driver {
            Some(driver) => driver,
            None => Driver::infer(&self.repo)?,
        };
        let name = self.name.unwrap_or_else(default_name);
        let workdir = self.workdir.unwrap_or_else(|| default_workdir(&name));

        let cloud = self.cloud.map(|provider| CloudConfig {
            region: self.cloud_region,
            instance_type: self.cloud_type,
            permission_set: self.cloud_permission_set,
            metadata: self.cloud_metadata.into_iter().collect::<BTreeMap<_, _>>(),
            gpu: self.cloud_gpu.and_then(normalize_gpu),
            hdd_size: self.cloud_hdd_size,
            ssh_private: self.cloud_ssh_private,
            spot: self.cloud_spot,
            spot_price: self.cloud_spot_price,
            startup_script: self.cloud_startup_script,
            aws_security_group: self.cloud_aws_security_group,
            aws_subnet: self.cloud_aws_subnet,
            ..CloudConfig::new(provider)
        });

        Ok(RunnerConfig {
            name,
            labels: RunnerLabels::parse(&self.labels),
            driver,
            repo: self.repo,
            token: self.token,
            idle_timeout: self.idle_timeout,
            single: self.single,
            reuse: self.reuse,
            reuse_idle: self.reuse_idle,
            no_retry: self.no_retry,
            workdir,
            docker_volumes: self.docker_volumes,
            cloud,
            tf_resource: self.tf_resource,
            tpi_version: self.tpi_version,
            runner_version: self.runner_version,
            destroy_delay: Duration::from_secs(self.destroy_delay),
        })
    }
}

fn default_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("cirun-{}", &id[..12])
}

fn default_workdir(name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cirun")
        .join(name)
}

fn normalize_gpu(gpu: String) -> Option<String> {
    match gpu.as_str() {
        "nogpu" | "" => None,
        "tesla" => {
            warn!("GPU model \"tesla\" has been deprecated; please use \"v100\" instead.");
            Some("v100".to_string())
        }
        _ => Some(gpu),
    }
}

pub fn parse_idle_timeout(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("never") {
        return Ok(Duration::ZERO);
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| format!("invalid idle timeout {raw:?}: {e}"))
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
