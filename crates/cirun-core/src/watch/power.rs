use std::path::PathBuf;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
#[cfg(unix)]
use tracing::{debug, info, warn};

#[cfg(unix)]
use cirun_model::ShutdownCause;

use crate::ShutdownHandle;

pub const ACPI_SOCKET: &str = "/var/run/acpid.socket";

/// Whether an acpid event line announces a power-button press.
pub fn is_power_off_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("power") && msg.contains("button")
}

/// Listens on the acpid socket and requests shutdown on a power-off event.
#[derive(Debug, Clone)]
pub struct PowerEventListener {
    socket: PathBuf,
}

impl PowerEventListener {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// The system listener; acpid exists only on Linux.
    pub fn for_platform() -> Option<Self> {
        cfg!(target_os = "linux").then(|| Self::new(ACPI_SOCKET))
    }

    pub fn spawn(self, shutdown: ShutdownHandle, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.listen(shutdown, cancel).await })
    }

    #[cfg(unix)]
    async fn listen(self, shutdown: ShutdownHandle, cancel: CancellationToken) {
        use tokio::{io::AsyncReadExt, net::UnixStream};

        let mut stream = match UnixStream::connect(&self.socket).await {
            Ok(stream) => {
                info!("Connected to acpid service.");
                stream
            }
            Err(e) => {
                warn!(
                    socket = %self.socket.display(),
                    "Error connecting to ACPI socket: {e}. The acpid.service helps with instance termination detection."
                );
                return;
            }
        };

        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                read = stream.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("acpid closed the connection");
                        return;
                    }
                    Ok(n) => {
                        let msg = String::from_utf8_lossy(&buf[..n]);
                        debug!(event = %msg.trim_end(), "acpid event");
                        if is_power_off_message(&msg) {
                            shutdown.request(ShutdownCause::reason("ACPI shutdown"));
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Error reading ACPI socket: {e}");
                        return;
                    }
                },
            }
        }
    }

    #[cfg(not(unix))]
    async fn listen(self, _shutdown: ShutdownHandle, _cancel: CancellationToken) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_power_button() {
        assert!(is_power_off_message("button/power PBTN 00000080 00000000\n"));
        assert!(is_power_off_message("BUTTON/POWER PWRF"));
        assert!(!is_power_off_message("ac_adapter ACPI0003:00 00000080 00000001"));
        assert!(!is_power_off_message("button/lid LID close"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn power_event_requests_shutdown() {
        use cirun_model::ShutdownCause;
        use tokio::{io::AsyncWriteExt, net::UnixListener, sync::mpsc};

        use crate::Trigger;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acpid.socket");
        let listener = UnixListener::bind(&path).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = PowerEventListener::new(&path)
            .spawn(ShutdownHandle::new(tx), CancellationToken::new());

        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"ac_adapter ACPI0003:00 00000080 00000001\n")
            .await
            .unwrap();
        conn.write_all(b"button/power PBTN 00000080 00000000\n")
            .await
            .unwrap();

        task.await.unwrap();
        match rx.recv().await {
            Some(Trigger::Shutdown(cause)) => {
                assert_eq!(cause, ShutdownCause::reason("ACPI shutdown"))
            }
            other => panic!("unexpected trigger: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_socket_is_not_fatal() {
        use tokio::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        PowerEventListener::new(dir.path().join("absent.socket"))
            .spawn(ShutdownHandle::new(tx), CancellationToken::new())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }
}
