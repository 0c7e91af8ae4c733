//! Runner lifecycle: launch, job tracking, and a once-only teardown.
//!
//! Every termination trigger (signals, runner exit, idle timeout, job
//! watchdog, power events, single-job completion, startup failures) is
//! delivered as a [`Trigger`] to one control loop owned by the
//! [`Orchestrator`], which runs the [`ShutdownSequence`] exactly once.
mod error;
pub use error::CoreError;

mod orchestrator;
pub use orchestrator::{Orchestrator, ShutdownHandle, Trigger};

mod output;

mod preflight;
pub use preflight::{Preflight, preflight};

mod shutdown;
pub use shutdown::{LifecycleState, ShutdownSequence};

mod strategy;
pub use strategy::{Launched, LocalRunner, ProvisioningStrategy, StrategyContext};

mod tracker;
pub use tracker::JobTracker;

pub mod watch;

#[cfg(test)]
mod testing;
