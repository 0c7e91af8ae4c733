use std::time::Duration;

use cirun_model::ShutdownCause;

/// Period of one idle tick.
pub const IDLE_TICK: Duration = Duration::from_secs(1);

/// Counts consecutive idle ticks; fires once the idle timeout is reached.
#[derive(Debug)]
pub struct IdleWatcher {
    timeout: u64,
    idle_ticks: u64,
}

impl IdleWatcher {
    /// Returns `None` for a zero timeout (never shut down when idle).
    pub fn new(idle_timeout: Duration) -> Option<Self> {
        let timeout = idle_timeout.as_secs();
        (timeout > 0).then_some(Self {
            timeout,
            idle_ticks: 0,
        })
    }

    pub fn tick(&mut self, pending: usize) -> Option<ShutdownCause> {
        if pending == 0 {
            self.idle_ticks += 1;
        } else {
            self.idle_ticks = 0;
        }

        (self.idle_ticks >= self.timeout)
            .then(|| ShutdownCause::reason(format!("timeout:{}", self.timeout)))
    }

    #[inline]
    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks
    }
}
