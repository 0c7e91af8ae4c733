use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{CloudProvider, ConfigError, Driver, RunnerLabels};

/// Immutable snapshot of all launch parameters.
///
/// Built once at startup by the entrypoint; every other component only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Name displayed on the CI platform once registered.
    pub name: String,
    pub labels: RunnerLabels,
    pub driver: Driver,
    /// Repository URL the runner registers against.
    pub repo: String,
    /// Personal access token. Never logged.
    #[serde(skip_serializing)]
    pub token: String,
    /// Inactivity before self-termination; zero disables the idle watcher.
    pub idle_timeout: Duration,
    /// Exit after running a single job.
    pub single: bool,
    /// Do not launch when a runner with the same name or labels is online.
    pub reuse: bool,
    /// Only launch when no matching runner is online and idle.
    pub reuse_idle: bool,
    /// Do not rerun pending jobs on teardown.
    pub no_retry: bool,
    pub workdir: PathBuf,
    /// Docker volumes mounted into jobs (GitLab only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docker_volumes: Vec<String>,
    /// Present when the runner is provisioned in the cloud.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudConfig>,
    /// Base64-encoded JSON of the infra resource this runner lives on.
    ///
    /// When set, teardown destroys that resource after `destroy_delay`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tf_resource: Option<String>,
    /// Version constraint of the terraform provider.
    pub tpi_version: String,
    /// Agent version installed on cloud instances.
    pub runner_version: String,
    /// Wait before destroying infrastructure, leaving time to collect logs.
    pub destroy_delay: Duration,
}

impl RunnerConfig {
    /// Rejects flag combinations that cannot be honoured together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.single && self.reuse {
            return Err(ConfigError::Conflict("single", "reuse"));
        }
        if self.single && self.reuse_idle {
            return Err(ConfigError::Conflict("single", "reuse-idle"));
        }
        if self.reuse && self.reuse_idle {
            return Err(ConfigError::Conflict("reuse", "reuse-idle"));
        }
        Ok(())
    }

    #[inline]
    pub fn is_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    #[inline]
    pub fn retries_enabled(&self) -> bool {
        !self.no_retry
    }

    /// Directory holding the infra template and state.
    #[inline]
    pub fn infra_dir(&self) -> &PathBuf {
        &self.workdir
    }
}

/// Parameters of a cloud-provisioned runner instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    pub provider: CloudProvider,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub permission_set: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdd_size: Option<u32>,
    /// Custom private SSH key. Never logged.
    #[serde(skip_serializing)]
    pub ssh_private: Option<String>,
    #[serde(default)]
    pub spot: bool,
    /// Maximum spot bid in USD; negative means the current market price.
    pub spot_price: f64,
    /// Base64-encoded shell script run on instance initialisation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_script: Option<String>,
    #[serde(default)]
    pub aws_security_group: String,
    #[serde(default)]
    pub aws_subnet: String,
}

impl CloudConfig {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            region: "us-west".to_string(),
            instance_type: None,
            permission_set: String::new(),
            metadata: BTreeMap::new(),
            gpu: None,
            hdd_size: None,
            ssh_private: None,
            spot: false,
            spot_price: -1.0,
            startup_script: None,
            aws_security_group: String::new(),
            aws_subnet: String::new(),
        }
    }
}
