use std::{any::Any, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cirun_exec::{ProcessEvent, RunnerProcess};
use cirun_infra::Provisioner;
use cirun_model::{JobEvent, RunnerConfig, ShutdownCause, ShutdownRequest};
use cirun_platform::CiPlatform;

use crate::{
    CoreError, LifecycleState, ShutdownSequence,
    output::{OutputChunk, spawn_log_parser},
    preflight::{Preflight, preflight},
    strategy::{Launched, LocalRunner, ProvisioningStrategy, StrategyContext},
    tracker::JobTracker,
    watch::{IDLE_TICK, WATCHDOG_TICK, spawn_signal_listener},
};

/// Message consumed by the orchestrator's control loop.
#[derive(Debug)]
pub enum Trigger {
    Shutdown(ShutdownCause),
    Process(ProcessEvent),
    /// Job events parsed from runner output, in output order.
    Jobs(Vec<JobEvent>),
}

impl From<ProcessEvent> for Trigger {
    fn from(ev: ProcessEvent) -> Self {
        Trigger::Process(ev)
    }
}

/// Cloneable handle any watcher uses to request a shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl ShutdownHandle {
    pub fn new(tx: mpsc::UnboundedSender<Trigger>) -> Self {
        Self { tx }
    }

    pub fn request(&self, cause: ShutdownCause) {
        if self.tx.send(Trigger::Shutdown(cause)).is_err() {
            debug!("orchestrator is gone, shutdown request dropped");
        }
    }

    /// Turn a panic of `task` into an error shutdown.
    pub fn monitor(&self, task: JoinHandle<()>, what: &'static str) {
        let handle = self.clone();
        tokio::spawn(async move {
            let Err(e) = task.await else { return };
            if e.is_panic() {
                let msg = panic_message(e.into_panic());
                error!(task = what, "task panicked: {msg}");
                handle.request(ShutdownCause::error(format!("{what} panicked: {msg}")));
            }
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| s.to_string()),
    }
}

/// Ticks every `period`, starting one period from now; missed ticks are not replayed.
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

enum Startup {
    Reused(String),
    Launched(Launched),
    /// Startup ended early: a failure or a trigger received while provisioning.
    Stopped(ShutdownCause),
}

/// Owns the runner lifecycle from preflight to teardown.
///
/// The control loop never awaits external calls until teardown; output
/// parsing and listeners run in monitored tasks that report back as triggers.
pub struct Orchestrator {
    config: Arc<RunnerConfig>,
    platform: Arc<dyn CiPlatform>,
    provisioner: Arc<dyn Provisioner>,
    state: LifecycleState,
    sequence: ShutdownSequence,
    tracker: JobTracker,
    tx: mpsc::UnboundedSender<Trigger>,
    rx: mpsc::UnboundedReceiver<Trigger>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: RunnerConfig,
        platform: Arc<dyn CiPlatform>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = LifecycleState::new();
        let sequence = ShutdownSequence::new(
            &config,
            Arc::clone(&platform),
            Arc::clone(&provisioner),
            state.clone(),
        );
        Self {
            tracker: JobTracker::new(config.single),
            config: Arc::new(config),
            platform,
            provisioner,
            state,
            sequence,
            tx,
            rx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.tx.clone())
    }

    pub fn state(&self) -> LifecycleState {
        self.state.clone()
    }

    /// Drive the lifecycle to completion and return the process exit code.
    pub async fn run(mut self) -> i32 {
        let signals = spawn_signal_listener(self.handle(), self.cancel.child_token());
        self.handle().monitor(signals, "signal listener");

        let mut early = Vec::new();
        match self.start(&mut early).await {
            Startup::Reused(msg) => {
                info!("{msg}");
                self.finish();
                0
            }
            Startup::Launched(Launched::Delegated) => {
                self.finish();
                0
            }
            Startup::Launched(Launched::Local(runner)) => self.supervise(runner, early).await,
            Startup::Stopped(cause) => self.shutdown(cause, None).await,
        }
    }

    /// Preflight and provisioning, raced against shutdown triggers.
    ///
    /// Process events arriving before provisioning returns are kept in `early`.
    async fn start(&mut self, early: &mut Vec<ProcessEvent>) -> Startup {
        let ctx = StrategyContext {
            config: Arc::clone(&self.config),
            platform: Arc::clone(&self.platform),
            provisioner: Arc::clone(&self.provisioner),
            events: self.tx.clone(),
            cancel: self.cancel.clone(),
        };
        let work = async move {
            if let Preflight::Reuse(msg) = preflight(&ctx.config, ctx.platform.as_ref()).await? {
                return Ok::<_, CoreError>(Startup::Reused(msg));
            }
            let strategy = ProvisioningStrategy::for_config(&ctx.config);
            Ok(Startup::Launched(strategy.provision(&ctx).await?))
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                res = &mut work => {
                    return res.unwrap_or_else(|e| Startup::Stopped(ShutdownCause::error(e)));
                }
                Some(trigger) = self.rx.recv() => match trigger {
                    Trigger::Shutdown(cause) => return Startup::Stopped(cause),
                    Trigger::Process(ev) => early.push(ev),
                    // the log parser starts with supervision
                    Trigger::Jobs(_) => {}
                },
            }
        }
    }

    async fn supervise(&mut self, runner: LocalRunner, early: Vec<ProcessEvent>) -> i32 {
        let LocalRunner {
            process,
            mut idle,
            watchdog,
        } = runner;
        self.state.mark_running();
        info!(name = %self.config.name, "runner is running");

        let (chunks, parser) = spawn_log_parser(
            Arc::clone(&self.platform),
            self.config.name.clone(),
            self.tx.clone(),
            self.cancel.child_token(),
        );
        self.handle().monitor(parser, "log parser");

        for ev in early {
            if let Some(cause) = on_process_event(&chunks, ev) {
                return self.shutdown(cause, Some(process)).await;
            }
        }

        let mut idle_tick = ticker(IDLE_TICK);
        let mut watchdog_tick = ticker(WATCHDOG_TICK);

        loop {
            let cause = tokio::select! {
                Some(trigger) = self.rx.recv() => match trigger {
                    Trigger::Shutdown(cause) => Some(cause),
                    Trigger::Process(ev) => on_process_event(&chunks, ev),
                    Trigger::Jobs(jobs) => self.on_jobs(jobs),
                },
                _ = idle_tick.tick(), if idle.is_some() => {
                    let pending = self.tracker.pending_count();
                    idle.as_mut().and_then(|w| w.tick(pending))
                }
                _ = watchdog_tick.tick(), if watchdog.is_some() => {
                    watchdog
                        .as_ref()
                        .and_then(|w| w.check(self.tracker.pending(), OffsetDateTime::now_utc()))
                }
                else => Some(ShutdownCause::error("trigger channel closed")),
            };

            if let Some(cause) = cause {
                return self.shutdown(cause, Some(process)).await;
            }
        }
    }

    fn on_jobs(&mut self, jobs: Vec<JobEvent>) -> Option<ShutdownCause> {
        for event in jobs {
            info!(
                status = event.status.as_str(),
                job = event.job_id.as_deref().unwrap_or_default(),
                pipeline = event.pipeline_id.as_deref().unwrap_or_default(),
                date = %event.date,
                "runner status"
            );
            if let Some(cause) = self.tracker.apply(&event) {
                return Some(cause);
            }
        }
        None
    }

    async fn shutdown(&mut self, cause: ShutdownCause, process: Option<RunnerProcess>) -> i32 {
        self.cancel.cancel();
        let request = ShutdownRequest::new(cause, &self.config);
        let pending = self.tracker.pending().to_vec();

        // only this loop calls execute, so the sequence always runs here
        self.sequence
            .execute(request, process, pending)
            .await
            .unwrap_or_default()
    }

    fn finish(&self) {
        self.cancel.cancel();
        self.state.mark_terminated();
    }
}

fn on_process_event(
    chunks: &mpsc::UnboundedSender<OutputChunk>,
    ev: ProcessEvent,
) -> Option<ShutdownCause> {
    match ev {
        ProcessEvent::Output { stream, data } => {
            if chunks.send((stream, data)).is_err() {
                debug!("log parser stopped, runner output dropped");
            }
            None
        }
        ProcessEvent::Exited { code: Some(0) } => {
            Some(ShutdownCause::reason("runner closed with exit code 0"))
        }
        ProcessEvent::Exited { code } => Some(ShutdownCause::error(format!(
            "runner closed with exit code {}",
            code.map_or_else(|| "none".to_string(), |c| c.to_string())
        ))),
        ProcessEvent::Lost { reason } => {
            Some(ShutdownCause::error(format!("runner process lost: {reason}")))
        }
    }
}
