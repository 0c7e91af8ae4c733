//! Runner subprocess with its output and lifetime reported as events.
//!
//! Both pipes are pumped by dedicated tasks; a supervising task owns the
//! [`Child`] and emits exactly one terminal event (`Exited` or `Lost`) after
//! the pipes drain, so output always precedes the exit notification.
use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use cirun_model::CommandSpec;

use crate::{
    error::ExecError,
    util::{cmd_program, interrupt},
};

const CHUNK_SIZE: usize = 8 * 1024;
const STOP_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw chunk read from one of the pipes.
    Output { stream: OutputStream, data: Vec<u8> },
    /// The child exited; `code` is `None` when killed by a signal.
    Exited { code: Option<i32> },
    /// The child could no longer be observed.
    Lost { reason: String },
}

/// Handle to a spawned runner agent.
pub struct RunnerProcess {
    pid: Option<u32>,
    stop: CancellationToken,
    done: JoinHandle<()>,
}

impl RunnerProcess {
    /// Spawn `spec` and forward every [`ProcessEvent`] into `sink`.
    pub fn spawn<T>(spec: &CommandSpec, sink: mpsc::UnboundedSender<T>) -> Result<Self, ExecError>
    where
        T: From<ProcessEvent> + Send + 'static,
    {
        if spec.program.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut cmd = cmd_program(&spec.program, &spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // args may carry registration secrets
        trace!(target: "cirun.exec", program = %spec.program, argc = spec.args.len(), "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", spec.program)))?;

        let stdout = child.stdout.take().ok_or(ExecError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecError::MissingPipe("stderr"))?;
        let pumps = [
            tokio::spawn(pump(stdout, OutputStream::Stdout, sink.clone())),
            tokio::spawn(pump(stderr, OutputStream::Stderr, sink.clone())),
        ];

        let pid = child.id();
        let stop = CancellationToken::new();
        let done = tokio::spawn(supervise(child, pumps, stop.clone(), sink));

        debug!(target: "cirun.exec", ?pid, "runner process spawned");
        Ok(Self { pid, stop, done })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Interrupt the child and wait until it is reaped.
    pub async fn terminate(self) -> Result<(), ExecError> {
        self.stop.cancel();
        self.done
            .await
            .map_err(|e| ExecError::Join(e.to_string()))
    }
}

async fn pump<R, T>(mut reader: R, stream: OutputStream, sink: mpsc::UnboundedSender<T>)
where
    R: AsyncRead + Unpin,
    T: From<ProcessEvent>,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = ProcessEvent::Output {
                    stream,
                    data: buf[..n].to_vec(),
                };
                if sink.send(event.into()).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(target: "cirun.exec", ?stream, "read failed: {e}");
                break;
            }
        }
    }
}

async fn supervise<T>(
    mut child: Child,
    pumps: [JoinHandle<()>; 2],
    stop: CancellationToken,
    sink: mpsc::UnboundedSender<T>,
) where
    T: From<ProcessEvent>,
{
    let status = tokio::select! {
        status = child.wait() => status,
        _ = stop.cancelled() => {
            debug!(target: "cirun.exec", "stop requested; interrupting child");
            if let Err(e) = interrupt(&mut child) {
                warn!(target: "cirun.exec", "interrupt failed: {e}");
            }
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(target: "cirun.exec", grace = ?STOP_GRACE, "child ignored SIGINT; killing");
                    let _ = child.kill().await;
                    child.wait().await
                }
            }
        }
    };

    for pump in pumps {
        let _ = pump.await;
    }

    let event = match status {
        Ok(status) => ProcessEvent::Exited {
            code: status.code(),
        },
        Err(e) => ProcessEvent::Lost {
            reason: format!("wait: {e}"),
        },
    };
    let _ = sink.send(event.into());
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<ProcessEvent>) -> (String, ProcessEvent) {
        let mut out = String::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                ProcessEvent::Output { data, .. } => out.push_str(&String::from_utf8_lossy(&data)),
                terminal => return (out, terminal),
            }
        }
        panic!("channel closed without terminal event");
    }

    #[tokio::test]
    async fn output_precedes_exit() {
        let (tx, rx) = mpsc::unbounded_channel::<ProcessEvent>();
        let _proc = RunnerProcess::spawn(&sh("echo hello; echo oops >&2"), tx).unwrap();

        let (out, terminal) = collect(rx).await;
        assert!(out.contains("hello"));
        assert!(out.contains("oops"));
        assert_eq!(terminal, ProcessEvent::Exited { code: Some(0) });
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel::<ProcessEvent>();
        let _proc = RunnerProcess::spawn(&sh("exit 3"), tx).unwrap();

        let (_, terminal) = collect(rx).await;
        assert_eq!(terminal, ProcessEvent::Exited { code: Some(3) });
    }

    #[tokio::test]
    async fn terminate_interrupts_child() {
        let (tx, rx) = mpsc::unbounded_channel::<ProcessEvent>();
        let proc = RunnerProcess::spawn(&sh("exec sleep 30"), tx).unwrap();
        assert!(proc.pid().is_some());

        proc.terminate().await.unwrap();
        let (_, terminal) = collect(rx).await;
        // sh dies from SIGINT, so no exit code is available
        assert_eq!(terminal, ProcessEvent::Exited { code: None });
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let (tx, _rx) = mpsc::unbounded_channel::<ProcessEvent>();
        let err = RunnerProcess::spawn(&CommandSpec::new("/nonexistent/cirun-runner"), tx)
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Spawn(_)));
    }

    #[test]
    fn empty_program_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel::<ProcessEvent>();
        assert!(matches!(
            RunnerProcess::spawn(&CommandSpec::default(), tx),
            Err(ExecError::MissingProgram)
        ));
    }
}
