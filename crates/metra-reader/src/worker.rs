//! Connection worker: one task per reader owning the transport.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────── worker task ────────────────┐
//! CommandChannel ───►│ requests ─► encode ─► transport.send        │
//!                    │                                             │
//!                    │ transport.recv ─► Framer ─► profile.classify │
//!                    │        Reply ─► decode ─► pending oneshot   │
//!                    │        Tags / InputChange ─► tracker, events│───► EventDispatcher
//!                    │        Heartbeat ─► liveness                │
//!                    └─────────────────────────────────────────────┘
//!                                        ▲
//!                         prepare task ──┘ (issues commands through a CommandChannel)
//! ```
//!
//! The task owns every piece of session state; callers only see the
//! [`CommandChannel`], the [`WorkerStatus`] watch and the shared tag
//! tracker. At most one command is outstanding at any time.
//!
//! # Lifecycle
//!
//! `Connecting → Configuring → Running`, and on any failure
//! `WaitingForReconnect` with capped exponential backoff before the next
//! attempt. [`ConnectionWorker::stop`] ends the task from any state.

use metra_core::constants::{HEARTBEAT_TIMEOUT_FACTOR, WORKER_REQUEST_CAPACITY};
use metra_core::{DeviceId, TagObservation};
use metra_protocol::{Command, Decoded, Frame, FrameCodec, Framer, Reply};
use metra_transport::Transport;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::channel::{CommandChannel, WorkerRequest};
use crate::config::ReaderConfig;
use crate::debounce::InputDebouncer;
use crate::dispatcher::EventDispatcher;
use crate::error::{ReaderError, Result};
use crate::event::{Event, EventKind};
use crate::profile::{FrameContext, FrameKind, PrepareOutcome, ReaderProfile};
use crate::state::{ConnectionState, WorkerStatus};
use crate::tracker::TagPresenceTracker;

/// Tag lines buffered while waiting for the footer of their block.
const MAX_PARTIAL_TAGS: usize = 4096;

/// Owns the link to one reader and keeps it alive.
pub struct ConnectionWorker<T: Transport, P: ReaderProfile> {
    device_id: DeviceId,
    channel: CommandChannel,
    status: watch::Receiver<WorkerStatus>,
    tracker: Arc<TagPresenceTracker>,
    dispatcher: Arc<EventDispatcher>,
    scanning: Arc<AtomicBool>,
    cancel: CancellationToken,
    /// Task state until `start` moves it onto the runtime.
    idle: Mutex<Option<WorkerTask<T, P>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport, P: ReaderProfile> ConnectionWorker<T, P> {
    /// Create a stopped worker.
    ///
    /// # Errors
    /// Returns `Protocol(Error::Config)` if `config` does not validate.
    pub fn new(config: ReaderConfig, transport: T, profile: Arc<P>) -> Result<Self> {
        config.validate()?;

        let device_id = config.device_id.clone();
        let (requests_tx, requests) = mpsc::channel(WORKER_REQUEST_CAPACITY);
        let channel = CommandChannel::new(requests_tx, config.command_timeout());
        let (status_tx, status) = watch::channel(WorkerStatus::default());
        let tracker = Arc::new(TagPresenceTracker::new(config.keep_time(), config.identity));
        let dispatcher = Arc::new(EventDispatcher::new(
            device_id.as_str(),
            config.event_capacity,
        ));
        let scanning = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let debouncer = config.debounce.enabled.then(|| {
            InputDebouncer::new(device_id.clone(), config.debounce, Arc::clone(&dispatcher))
        });

        let task = WorkerTask {
            backoff: Backoff::new(config.backoff),
            codec: profile.codec(),
            framer: Framer::new(),
            pending: None,
            partial_tags: Vec::new(),
            heartbeat: None,
            last_rx: Instant::now(),
            device_id: device_id.clone(),
            transport,
            profile,
            channel: channel.clone(),
            requests,
            status: status_tx,
            tracker: Arc::clone(&tracker),
            dispatcher: Arc::clone(&dispatcher),
            scanning: Arc::clone(&scanning),
            debouncer,
            cancel: cancel.clone(),
            config,
        };

        Ok(Self {
            device_id,
            channel,
            status,
            tracker,
            dispatcher,
            scanning,
            cancel,
            idle: Mutex::new(Some(task)),
            handle: Mutex::new(None),
        })
    }

    /// Spawn the worker task and the event delivery thread.
    ///
    /// Calling `start` on a running worker does nothing. A stopped worker
    /// cannot be restarted.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `Dispatcher` if the delivery thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut idle = lock(&self.idle);
        if idle.is_none() {
            return Ok(());
        }

        self.dispatcher.start()?;

        if let Some(task) = idle.take() {
            info!(
                device = %self.device_id,
                endpoint = %task.transport.endpoint(),
                profile = task.profile.name(),
                "Starting reader worker"
            );
            *lock(&self.handle) = Some(tokio::spawn(task.run()));
        }
        Ok(())
    }

    /// Stop the worker and wait for it to finish.
    ///
    /// Pending commands fail with `Stopped`, the transport is closed and
    /// every event published so far is delivered before this returns.
    /// Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let never_started = lock(&self.idle).take();
        if let Some(mut task) = never_started {
            task.shutdown().await;
        }

        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(device = %self.device_id, error = %e, "Reader worker task failed");
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.stop()).await {
            warn!(device = %self.device_id, error = %e, "Event dispatcher did not stop cleanly");
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Handle for issuing commands.
    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn tracker(&self) -> &Arc<TagPresenceTracker> {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Latest status snapshot.
    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<WorkerStatus> {
        self.status.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Transport is open.
    pub fn is_connected(&self) -> bool {
        self.current_state().is_connected()
    }

    /// Device is prepared and serving requests.
    pub fn is_working(&self) -> bool {
        self.current_state().is_working()
    }

    /// Enable the stale-tag sweep used during continuous scans.
    pub fn set_scanning(&self, scanning: bool) {
        self.scanning.store(scanning, Ordering::Release);
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }
}

impl<T: Transport, P: ReaderProfile> Drop for ConnectionWorker<T, P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Command awaiting its complete reply.
struct Pending {
    command: Command,
    reply: oneshot::Sender<Result<Reply>>,
    deadline: Instant,
    /// Frames received so far, each followed by CR.
    text: String,
}

impl Pending {
    fn fail(self, error: ReaderError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Why a session ended.
enum SessionEnd {
    Cancelled,
    Failed(String),
}

/// Everything owned by the running worker task.
struct WorkerTask<T, P> {
    device_id: DeviceId,
    config: ReaderConfig,
    transport: T,
    profile: Arc<P>,
    channel: CommandChannel,
    requests: mpsc::Receiver<WorkerRequest>,
    status: watch::Sender<WorkerStatus>,
    tracker: Arc<TagPresenceTracker>,
    dispatcher: Arc<EventDispatcher>,
    scanning: Arc<AtomicBool>,
    debouncer: Option<InputDebouncer>,
    cancel: CancellationToken,
    backoff: Backoff,

    // Session state, reset on every connect
    codec: FrameCodec,
    framer: Framer,
    pending: Option<Pending>,
    partial_tags: Vec<TagObservation>,
    heartbeat: Option<Duration>,
    last_rx: Instant,
}

impl<T: Transport, P: ReaderProfile> WorkerTask<T, P> {
    async fn run(mut self) {
        while !self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting, None);

            let connected = reject_requests_until(
                &mut self.requests,
                &self.cancel,
                self.transport.connect(),
            )
            .await;

            let failure = match connected {
                None => break,
                Some(Ok(())) => {
                    let end = self.session().await;
                    if let Err(e) = self.transport.disconnect().await {
                        debug!(device = %self.device_id, error = %e, "Disconnect failed");
                    }
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Failed(reason) => reason,
                    }
                }
                Some(Err(e)) => e.to_string(),
            };

            self.wait_for_reconnect(failure).await;
        }

        self.shutdown().await;
    }

    async fn wait_for_reconnect(&mut self, reason: String) {
        let delay = self.backoff.next_delay();
        warn!(
            device = %self.device_id,
            error = %reason,
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "Reader connection failed, retrying"
        );
        self.status.send_modify(|status| status.attempt = self.backoff.attempts());
        self.set_state(ConnectionState::WaitingForReconnect, Some(reason));

        reject_requests_until(&mut self.requests, &self.cancel, tokio::time::sleep(delay)).await;
    }

    async fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.fail(ReaderError::Stopped);
        }
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            request.reject(|| ReaderError::Stopped);
        }
        if let Some(debouncer) = &self.debouncer {
            debouncer.stop();
        }
        if self.transport.is_connected() {
            if let Err(e) = self.transport.disconnect().await {
                debug!(device = %self.device_id, error = %e, "Disconnect failed");
            }
        }
        self.set_state(ConnectionState::Stopped, None);
        info!(device = %self.device_id, "Reader worker stopped");
    }

    async fn session(&mut self) -> SessionEnd {
        self.codec = self.profile.codec();
        self.framer = Framer::new();
        self.partial_tags.clear();
        self.heartbeat = None;
        self.last_rx = Instant::now();
        self.set_state(ConnectionState::Configuring, None);

        let profile = Arc::clone(&self.profile);
        let channel = self.channel.clone();
        let prepare_config = self.config.prepare;
        let mut prepare = Some(tokio::spawn(async move {
            profile.prepare(channel, prepare_config).await
        }));

        let end = self.serve(&mut prepare).await;

        if let Some(task) = prepare {
            task.abort();
        }
        if let Some(pending) = self.pending.take() {
            let error = match end {
                SessionEnd::Cancelled => ReaderError::Stopped,
                SessionEnd::Failed(_) => ReaderError::NotConnected,
            };
            pending.fail(error);
        }
        end
    }

    async fn serve(&mut self, prepare: &mut Option<JoinHandle<Result<PrepareOutcome>>>) -> SessionEnd {
        let poll_interval = self.config.poll_interval();
        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let command_deadline = self.pending.as_ref().map(|p| p.deadline);
            let heartbeat_deadline = self
                .heartbeat
                .map(|interval| self.last_rx + interval * HEARTBEAT_TIMEOUT_FACTOR);
            let scanning = self.scanning.load(Ordering::Acquire);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,

                outcome = join_prepare(prepare) => match outcome {
                    Ok(outcome) => self.prepared(outcome),
                    Err(e @ ReaderError::PrepareFailed { .. }) => return SessionEnd::Failed(e.to_string()),
                    Err(e) => return SessionEnd::Failed(ReaderError::prepare_failed(e.to_string()).to_string()),
                },

                Some(request) = self.requests.recv() => {
                    if let Err(reason) = self.handle_request(request).await {
                        return SessionEnd::Failed(reason);
                    }
                }

                _ = sleep_until(command_deadline) => {
                    if let Some(pending) = self.pending.take() {
                        debug!(device = %self.device_id, command = %pending.command, "Command timed out");
                        let timeout_ms = self.config.command_timeout_ms;
                        pending.fail(ReaderError::timeout(timeout_ms));
                    }
                }

                _ = sleep_until(heartbeat_deadline) => {
                    return SessionEnd::Failed("heartbeat missed".to_string());
                }

                _ = sweep.tick(), if scanning => self.sweep(),

                received = self.transport.recv(poll_interval) => match received {
                    Ok(byte) => {
                        self.last_rx = Instant::now();
                        if let Some(frame) = self.framer.push(byte) {
                            if let Some(reason) = self.route(frame) {
                                return SessionEnd::Failed(reason);
                            }
                        }
                    }
                    Err(e) if e.is_fatal() => return SessionEnd::Failed(e.to_string()),
                    Err(_) => {}
                },
            }
        }
    }

    fn prepared(&mut self, outcome: PrepareOutcome) {
        info!(
            device = %self.device_id,
            status = %outcome.status,
            heartbeat_ms = outcome.heartbeat.map(|hb| hb.as_millis() as u64),
            "Reader prepared"
        );
        self.backoff.reset();
        self.status.send_modify(|status| {
            status.attempt = 0;
            status.device_status = Some(outcome.status);
        });
        self.set_state(ConnectionState::Running, None);
    }

    /// Perform one request. `Err` carries the reason the session must end.
    async fn handle_request(&mut self, request: WorkerRequest) -> std::result::Result<(), String> {
        match request {
            WorkerRequest::Execute {
                command,
                reply,
                deadline,
            } => {
                if reply.is_closed() {
                    // The caller gave up while the request was queued
                    return Ok(());
                }

                if let Some(stale) = self.pending.take() {
                    debug!(device = %self.device_id, command = %stale.command, "Superseding unanswered command");
                    let error = ReaderError::busy(stale.command.verb());
                    stale.fail(error);
                }

                let bytes = match self.codec.encode(&command) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        return Ok(());
                    }
                };

                trace!(device = %self.device_id, %command, "Sending command");
                self.pending = Some(Pending {
                    command,
                    reply,
                    deadline,
                    text: String::new(),
                });

                if let Err(e) = self.transport.send(&bytes).await {
                    let reason = e.to_string();
                    if let Some(pending) = self.pending.take() {
                        pending.fail(e.into());
                    }
                    return Err(reason);
                }
            }
            WorkerRequest::SetEndOfFrame { enabled, done } => {
                self.framer.set_end_of_frame(enabled);
                let _ = done.send(());
            }
            WorkerRequest::SetHeartbeat { interval, done } => {
                self.heartbeat = interval;
                self.last_rx = Instant::now();
                let _ = done.send(());
            }
            WorkerRequest::SetChecksum { enabled, done } => {
                self.codec.set_checksum(enabled);
                let _ = done.send(());
            }
        }
        Ok(())
    }

    /// Act on one frame. Returns the reason if the session must end.
    ///
    /// Every frame is checksum-verified before it is classified; replies
    /// are decoded from the frame as received.
    fn route(&mut self, frame: Frame) -> Option<String> {
        let checked = match self.codec.verify(&frame) {
            Ok(checked) => checked,
            Err(e) => {
                self.reject_frame(&frame, e);
                return None;
            }
        };

        let context = FrameContext::new(
            self.pending.as_ref().map(|p| &p.command),
            self.scanning.load(Ordering::Acquire),
        );
        match self.profile.classify(&checked, context) {
            FrameKind::Reply => self.reply_frame(&frame),
            FrameKind::Heartbeat => trace!(device = %self.device_id, "Heartbeat"),
            FrameKind::InputChange { pin, high } => self.input_changed(pin, high),
            FrameKind::Tags(observations) => {
                let mut block = std::mem::take(&mut self.partial_tags);
                block.extend(observations);
                self.tags_seen(block);
            }
            FrameKind::PartialTags(observations) => {
                if self.partial_tags.len() + observations.len() > MAX_PARTIAL_TAGS {
                    warn!(
                        device = %self.device_id,
                        dropped = self.partial_tags.len(),
                        "Tag block without footer, discarding buffered lines"
                    );
                    self.partial_tags.clear();
                }
                self.partial_tags.extend(observations);
            }
            FrameKind::SoftReset => return Some("device restarted".to_string()),
            FrameKind::Ignored => debug!(device = %self.device_id, %frame, "Ignoring unsolicited frame"),
        }
        None
    }

    /// Drop a frame that failed verification.
    ///
    /// The frame cannot be attributed, so a pending command fails with the
    /// verification error rather than risk pairing it with a later frame.
    fn reject_frame(&mut self, frame: &Frame, error: metra_core::Error) {
        warn!(device = %self.device_id, %frame, error = %error, "Dropping corrupted frame");
        self.status.send_modify(|status| status.protocol_errors += 1);
        if let Some(pending) = self.pending.take() {
            pending.fail(error.into());
        }
    }

    fn tags_seen(&self, observations: Vec<TagObservation>) {
        for observation in observations {
            if let Some(tag) = self.tracker.observe(observation) {
                self.publish(EventKind::TagArrived { tag });
            }
        }
    }

    fn reply_frame(&mut self, frame: &Frame) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        pending.text.push_str(&frame.text());
        if !pending.text.ends_with('\r') {
            pending.text.push('\r');
        }

        match self.codec.decode(&pending.command, &pending.text) {
            Ok(Decoded::Partial) => {}
            Ok(Decoded::Complete(reply)) => {
                if let Some(pending) = self.pending.take() {
                    let _ = pending.reply.send(Ok(reply));
                }
            }
            Err(e) => {
                if let Some(pending) = self.pending.take() {
                    debug!(device = %self.device_id, command = %pending.command, error = %e, "Command failed");
                    pending.fail(e.into());
                }
            }
        }
    }

    fn input_changed(&mut self, pin: u8, high: bool) {
        self.status.send_modify(|status| {
            status.input_pins.insert(pin, high);
        });
        match &self.debouncer {
            Some(debouncer) => debouncer.update(pin, high),
            None => self.publish(EventKind::InputPinChanged { pin, high }),
        }
    }

    fn sweep(&self) {
        for tag in self.tracker.expire() {
            self.publish(EventKind::TagLost { tag });
        }
    }

    fn publish(&self, kind: EventKind) {
        self.dispatcher.publish(Event::now(self.device_id.clone(), kind));
    }

    fn set_state(&self, state: ConnectionState, error: Option<String>) {
        let current = self.status.borrow().state;
        if current == state {
            return;
        }
        if !current.can_transition_to(&state) {
            warn!(device = %self.device_id, from = %current, to = %state, "Ignoring invalid state transition");
            return;
        }

        self.status.send_modify(|status| {
            status.state = state;
            if error.is_some() {
                status.last_error.clone_from(&error);
            }
        });
        info!(device = %self.device_id, from = %current, to = %state, "Reader state changed");
        self.publish(EventKind::ConnectionStateChanged { state, error });
    }
}

/// Drive `future` to completion while answering requests with
/// `NotConnected`. Returns `None` if cancelled first.
async fn reject_requests_until<F: Future>(
    requests: &mut mpsc::Receiver<WorkerRequest>,
    cancel: &CancellationToken,
    future: F,
) -> Option<F::Output> {
    tokio::pin!(future);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            output = &mut future => return Some(output),
            Some(request) = requests.recv() => request.reject(|| ReaderError::NotConnected),
        }
    }
}

async fn join_prepare(task: &mut Option<JoinHandle<Result<PrepareOutcome>>>) -> Result<PrepareOutcome> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let joined = handle.await;
    *task = None;
    joined.unwrap_or_else(|e| Err(ReaderError::prepare_failed(e.to_string())))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
