//! How the runner gets launched: as a local process or on a cloud instance.
use std::{path::Path, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cirun_exec::RunnerProcess;
use cirun_infra::Provisioner;
use cirun_model::RunnerConfig;
use cirun_platform::CiPlatform;

use crate::{
    CoreError, ShutdownHandle, Trigger,
    watch::{IdleWatcher, JobWatchdog},
};

mod cloud;
mod local;

/// Everything a strategy needs to launch the runner.
#[derive(Clone)]
pub struct StrategyContext {
    pub config: Arc<RunnerConfig>,
    pub platform: Arc<dyn CiPlatform>,
    pub provisioner: Arc<dyn Provisioner>,
    pub events: mpsc::UnboundedSender<Trigger>,
    pub cancel: CancellationToken,
}

impl StrategyContext {
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.events.clone())
    }
}

/// A runner agent running in this process's tree, with its watchers.
pub struct LocalRunner {
    pub process: RunnerProcess,
    pub idle: Option<IdleWatcher>,
    pub watchdog: Option<JobWatchdog>,
}

pub enum Launched {
    Local(LocalRunner),
    /// The instance runs its own agent; nothing is left to supervise here.
    Delegated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStrategy {
    Local,
    Cloud,
}

impl ProvisioningStrategy {
    pub fn for_config(config: &RunnerConfig) -> Self {
        if config.is_cloud() {
            ProvisioningStrategy::Cloud
        } else {
            ProvisioningStrategy::Local
        }
    }

    pub async fn provision(&self, ctx: &StrategyContext) -> Result<Launched, CoreError> {
        prepare_workdir(&ctx.config.workdir).await?;
        match self {
            ProvisioningStrategy::Local => local::launch(ctx).await.map(Launched::Local),
            ProvisioningStrategy::Cloud => cloud::deploy(ctx).await.map(|()| Launched::Delegated),
        }
    }
}

/// Create the working directory with mode 0766.
pub(crate) async fn prepare_workdir(dir: &Path) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(dir).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o766)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workdir_is_created_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("a/b/runner");
        prepare_workdir(&workdir).await.unwrap();
        assert!(workdir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&workdir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o766);
        }

        // already existing is fine
        prepare_workdir(&workdir).await.unwrap();
    }
}
