use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use cirun_exec::OutputStream;
use cirun_platform::CiPlatform;

use crate::Trigger;

/// Reassembles runner output into whole lines; pipe reads split lines arbitrarily.
#[derive(Debug, Default)]
pub(crate) struct LineAssembler {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl LineAssembler {
    /// Append a chunk and return the complete lines it finished, newline included.
    pub(crate) fn push(&mut self, stream: OutputStream, data: &[u8]) -> Option<Vec<u8>> {
        let buf = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.extend_from_slice(data);

        let end = buf.iter().rposition(|b| *b == b'\n')? + 1;
        let rest = buf.split_off(end);
        Some(std::mem::replace(buf, rest))
    }
}

pub(crate) type OutputChunk = (OutputStream, Vec<u8>);

/// Parse runner output off the control loop.
///
/// Parsing may call the platform API, so it runs in its own task and reports
/// job events back as [`Trigger::Jobs`], in output order.
pub(crate) fn spawn_log_parser(
    platform: Arc<dyn CiPlatform>,
    runner_name: String,
    events: mpsc::UnboundedSender<Trigger>,
    cancel: CancellationToken,
) -> (mpsc::UnboundedSender<OutputChunk>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputChunk>();

    let task = tokio::spawn(async move {
        let mut lines = LineAssembler::default();
        loop {
            let (stream, data) = tokio::select! {
                _ = cancel.cancelled() => return,
                chunk = rx.recv() => match chunk {
                    Some(chunk) => chunk,
                    None => return,
                },
            };
            let Some(buf) = lines.push(stream, &data) else {
                continue;
            };
            trace!(
                target: "cirun.runner",
                ?stream,
                output = %String::from_utf8_lossy(&buf).trim_end(),
                "runner output"
            );

            let parsed = tokio::select! {
                _ = cancel.cancelled() => return,
                parsed = platform.parse_log_chunk(&buf, &runner_name) => parsed,
            };
            match parsed {
                Ok(jobs) if jobs.is_empty() => {}
                Ok(jobs) => {
                    if events.send(Trigger::Jobs(jobs)).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("failed to parse runner output: {e}"),
            }
        }
    });

    (tx, task)
}
