use thiserror::Error;

use cirun_exec::ExecError;
use cirun_infra::InfraError;
use cirun_model::ConfigError;
use cirun_platform::PlatformError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("infra error: {0}")]
    Infra(#[from] InfraError),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
