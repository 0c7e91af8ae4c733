//! Sources of shutdown triggers besides the runner process itself.
mod idle;
pub use idle::{IDLE_TICK, IdleWatcher};

mod power;
pub use power::{ACPI_SOCKET, PowerEventListener, is_power_off_message};

mod signals;
pub use signals::{spawn_signal_listener, wait_for_termination_signal};

mod watchdog;
pub use watchdog::{GITHUB_JOB_CEILING, JobWatchdog, WATCHDOG_TICK};
