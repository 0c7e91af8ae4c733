mod driver;
pub use driver::{CloudProvider, Driver};

mod labels;
pub use labels::RunnerLabels;

mod config;
pub use config::{CloudConfig, RunnerConfig};

mod job;
pub use job::{JobEvent, JobStatus, RunningJob};

mod runner;
pub use runner::RunnerInfo;

mod shutdown;
pub use shutdown::{OrchestratorState, ShutdownCause, ShutdownRequest};

mod command;
pub use command::CommandSpec;
