//! Request path from callers to the connection worker.
//!
//! ```text
//! caller ─┐                                   ┌─> encode ─> transport
//! caller ─┼─ lock ─> WorkerRequest (mpsc) ─> worker
//! prepare ┘                                   └─< decode <─ framer
//!          <──────────── oneshot reply ───────────┘
//! ```
//!
//! The channel lock admits one command at a time per device. A second
//! caller waits until the first has its reply or has timed out.

use metra_protocol::{Command, Reply};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::trace;

use crate::error::{ReaderError, Result};

/// Message from a [`CommandChannel`] to the worker.
#[derive(Debug)]
pub(crate) enum WorkerRequest {
    /// Send a command and answer once its reply is complete or the deadline passes.
    Execute {
        command: Command,
        reply: oneshot::Sender<Result<Reply>>,
        deadline: Instant,
    },
    SetEndOfFrame {
        enabled: bool,
        done: oneshot::Sender<()>,
    },
    SetHeartbeat {
        interval: Option<Duration>,
        done: oneshot::Sender<()>,
    },
    SetChecksum {
        enabled: bool,
        done: oneshot::Sender<()>,
    },
}

impl WorkerRequest {
    /// Answer the request with an error without performing it.
    pub(crate) fn reject(self, error: impl FnOnce() -> ReaderError) {
        match self {
            Self::Execute { reply, .. } => {
                let _ = reply.send(Err(error()));
            }
            // Dropping `done` makes the caller see the worker as unavailable
            Self::SetEndOfFrame { .. } | Self::SetHeartbeat { .. } | Self::SetChecksum { .. } => {}
        }
    }
}

/// Cloneable handle for issuing commands to one reader.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    requests: mpsc::Sender<WorkerRequest>,
    lock: Arc<Mutex<()>>,
    default_timeout: Duration,
}

impl CommandChannel {
    pub(crate) fn new(requests: mpsc::Sender<WorkerRequest>, default_timeout: Duration) -> Self {
        Self {
            requests,
            lock: Arc::new(Mutex::new(())),
            default_timeout,
        }
    }

    /// Timeout used by [`send`](Self::send).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute with the configured default timeout.
    pub async fn send(&self, command: Command) -> Result<Reply> {
        self.execute(command, self.default_timeout).await
    }

    /// Send `command` and wait for its complete reply.
    ///
    /// Waiting for the channel lock does not count against `timeout`.
    ///
    /// # Errors
    /// - `Timeout` when no complete reply arrived in time (no retry)
    /// - `NotConnected` while the worker has no session
    /// - `Protocol` for checksum, framing and device-reported errors
    /// - `Stopped` once the worker has shut down
    pub async fn execute(&self, command: Command, timeout: Duration) -> Result<Reply> {
        let _guard = self.lock.lock().await;

        let (reply, response) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        trace!(%command, timeout_ms = timeout.as_millis() as u64, "Executing command");

        self.requests
            .send(WorkerRequest::Execute {
                command,
                reply,
                deadline,
            })
            .await
            .map_err(|_| ReaderError::Stopped)?;

        match tokio::time::timeout_at(deadline, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ReaderError::Stopped),
            Err(_) => Err(ReaderError::timeout(timeout.as_millis() as u64)),
        }
    }

    /// Like [`execute`](Self::execute) but returns the reply text as received.
    pub async fn execute_raw(&self, command: Command, timeout: Duration) -> Result<String> {
        let reply = self.execute(command, timeout).await?;
        Ok(reply.raw().to_string())
    }

    /// Switch the framer between CR and LF terminated frames.
    pub async fn set_end_of_frame(&self, enabled: bool) -> Result<()> {
        self.control(|done| WorkerRequest::SetEndOfFrame { enabled, done })
            .await
    }

    /// Expect a heartbeat at least every `interval`; `None` disables the watch.
    pub async fn set_heartbeat(&self, interval: Option<Duration>) -> Result<()> {
        self.control(|done| WorkerRequest::SetHeartbeat { interval, done })
            .await
    }

    /// Enable or disable CRC16 checksums on the codec.
    pub async fn set_checksum(&self, enabled: bool) -> Result<()> {
        self.control(|done| WorkerRequest::SetChecksum { enabled, done })
            .await
    }

    async fn control(&self, request: impl FnOnce(oneshot::Sender<()>) -> WorkerRequest) -> Result<()> {
        let (done, applied) = oneshot::channel();
        self.requests
            .send(request(done))
            .await
            .map_err(|_| ReaderError::Stopped)?;
        applied.await.map_err(|_| ReaderError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metra_protocol::Reply;

    /// Minimal stand-in for the worker: answers every command after `delay`
    /// with a reply carrying the command's verb.
    fn echo_worker(delay: Duration) -> (CommandChannel, tokio::task::JoinHandle<Vec<String>>) {
        let (tx, mut rx) = mpsc::channel(8);
        let worker = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(request) = rx.recv().await {
                if let WorkerRequest::Execute { command, reply, .. } = request {
                    seen.push(command.verb().to_string());
                    tokio::time::sleep(delay).await;
                    let _ = reply.send(Ok(Reply::new(command.verb(), vec![], "OK\r")));
                }
            }
            seen
        });
        (CommandChannel::new(tx, Duration::from_millis(100)), worker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_are_serialized() {
        let (channel, worker) = echo_worker(Duration::from_millis(50));
        let timeout = Duration::from_millis(200);

        let (a, b) = futures::join!(
            channel.execute(Command::new("REV"), timeout),
            channel.execute(Command::new("INV"), timeout),
        );
        assert_eq!(a.unwrap().verb(), "REV");
        assert_eq!(b.unwrap().verb(), "INV");

        drop(channel);
        assert_eq!(worker.await.unwrap(), ["REV", "INV"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_reply() {
        let (channel, _worker) = echo_worker(Duration::from_secs(10));
        let result = channel.execute(Command::new("INV"), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ReaderError::Timeout { duration_ms: 100 })));
    }

    #[tokio::test]
    async fn test_stopped_worker() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let channel = CommandChannel::new(tx, Duration::from_millis(100));

        assert!(matches!(channel.send(Command::new("REV")).await, Err(ReaderError::Stopped)));
        assert!(matches!(channel.set_checksum(true).await, Err(ReaderError::Stopped)));
    }

    #[tokio::test]
    async fn test_rejected_request() {
        let (tx, mut rx) = mpsc::channel(1);
        let channel = CommandChannel::new(tx, Duration::from_millis(100));
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                request.reject(|| ReaderError::NotConnected);
            }
        });

        assert!(matches!(channel.send(Command::new("REV")).await, Err(ReaderError::NotConnected)));
        assert!(matches!(channel.set_end_of_frame(true).await, Err(ReaderError::NotConnected)));
    }
}
