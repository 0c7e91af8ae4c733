use std::path::Path;

use async_trait::async_trait;

use cirun_model::RunnerConfig;

use crate::{InfraError, TfState};

/// Infrastructure-as-code backend used to create and destroy runner instances.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn check_minimum_version(&self) -> Result<(), InfraError>;

    /// Template declaring only the provider, used to destroy an injected resource.
    fn render_local_destroy_template(&self, provider_version: &str) -> String;

    /// Template provisioning a cloud instance that runs the agent in local mode.
    fn render_cloud_runner_template(&self, config: &RunnerConfig) -> Result<String, InfraError>;

    async fn init_workspace(&self, dir: &Path) -> Result<(), InfraError>;

    async fn apply(&self, dir: &Path) -> Result<(), InfraError>;

    /// Returns the tool output for debugging.
    async fn destroy(&self, dir: &Path) -> Result<String, InfraError>;

    async fn load_state(&self, path: &Path) -> Result<TfState, InfraError>;

    async fn save_state(&self, state: &TfState, path: &Path) -> Result<(), InfraError>;
}
