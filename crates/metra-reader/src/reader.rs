//! The [`Reader`] facade: one metraTec reader behind a small async API.
//!
//! # Examples
//!
//! ```no_run
//! use metra_reader::{AsciiProfile, Reader, ReaderConfig};
//! use metra_transport::{TcpTransport, TcpTransportConfig};
//!
//! # async fn example() -> metra_reader::Result<()> {
//! let transport = TcpTransport::new(TcpTransportConfig {
//!     addr: "192.168.2.239:10001".to_string(),
//!     ..TcpTransportConfig::default()
//! });
//! let reader = Reader::new(ReaderConfig::default(), transport, AsciiProfile::new())?;
//!
//! reader.subscribe(|event| {
//!     println!("{}: {:?}", event.device_id, event.kind);
//!     Ok(())
//! });
//! reader.start()?;
//!
//! let present = reader.inventory().await?;
//! println!("{} tags in the field", present.len());
//!
//! reader.stop().await;
//! # Ok(())
//! # }
//! ```

use metra_core::{DeviceId, Tag, TagObservation};
use metra_protocol::Command;
use metra_transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ReaderConfig;
use crate::dispatcher::{ListenerError, SubscriptionId};
use crate::error::{ReaderError, Result};
use crate::event::{Event, EventKind};
use crate::profile::ReaderProfile;
use crate::state::{ConnectionState, WorkerStatus};
use crate::tracker::PresenceChange;
use crate::worker::ConnectionWorker;

/// A metraTec reader.
pub struct Reader<T: Transport, P: ReaderProfile> {
    worker: ConnectionWorker<T, P>,
    profile: Arc<P>,
    scan_active: AtomicBool,
}

impl<T: Transport, P: ReaderProfile> Reader<T, P> {
    /// Create a stopped reader.
    ///
    /// # Errors
    /// Returns `Protocol(Error::Config)` if `config` does not validate.
    pub fn new(config: ReaderConfig, transport: T, profile: P) -> Result<Self> {
        let profile = Arc::new(profile);
        let worker = ConnectionWorker::new(config, transport, Arc::clone(&profile))?;
        Ok(Self {
            worker,
            profile,
            scan_active: AtomicBool::new(false),
        })
    }

    /// Start connecting. Idempotent; must be called within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.worker.start()
    }

    /// Stop the reader and wait until the worker has exited.
    ///
    /// A running scan is abandoned without sending the stop command.
    pub async fn stop(&self) {
        self.scan_active.store(false, Ordering::Release);
        self.worker.set_scanning(false);
        self.worker.stop().await;
    }

    pub fn device_id(&self) -> &DeviceId {
        self.worker.device_id()
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    /// Send a command and return the fields of each reply line.
    pub async fn command<I, S>(&self, verb: &str, params: I) -> Result<Vec<Vec<String>>>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let reply = self
            .worker
            .channel()
            .send(Command::new(verb).params_from(params))
            .await?;
        Ok(reply.lines().to_vec())
    }

    /// Send a command and return the reply text as received.
    pub async fn command_raw<I, S>(&self, verb: &str, params: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let channel = self.worker.channel();
        channel
            .execute_raw(Command::new(verb).params_from(params), channel.default_timeout())
            .await
    }

    /// Send a command with an explicit timeout.
    pub async fn execute(&self, command: Command, timeout: Duration) -> Result<metra_protocol::Reply> {
        self.worker.channel().execute(command, timeout).await
    }

    /// Run one inventory round and update the presence tracker.
    ///
    /// Publishes `TagArrived` and `TagLost` for the changes this round
    /// caused, then `InventoryUpdated` with every tag present.
    ///
    /// # Errors
    /// `Busy` while a continuous scan is running, plus every
    /// [`CommandChannel::execute`](crate::CommandChannel::execute) error.
    pub async fn inventory(&self) -> Result<Vec<Tag>> {
        if self.scan_active.load(Ordering::Acquire) {
            return Err(ReaderError::busy("scan"));
        }

        let reply = self
            .worker
            .channel()
            .send(self.profile.inventory_command())
            .await?;
        let observed = self.profile.parse_inventory(&reply)?;
        let change = self.worker.tracker().update(observed);
        debug!(
            device = %self.device_id(),
            arrived = change.arrived.len(),
            departed = change.departed.len(),
            present = change.present.len(),
            "Inventory round"
        );

        self.publish_change(&change);
        Ok(change.present)
    }

    /// Start continuous scanning.
    ///
    /// Tags reported while scanning raise `TagArrived`; tags unseen for the
    /// keep time raise `TagLost`.
    ///
    /// # Errors
    /// `Busy` if a scan is already running, plus every command error.
    pub async fn start_scan(&self) -> Result<()> {
        if self
            .scan_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReaderError::busy("scan"));
        }

        let start = self.profile.scan_commands().start;
        let reply = match self.worker.channel().send(start).await {
            Ok(reply) => reply,
            Err(e) => {
                self.scan_active.store(false, Ordering::Release);
                return Err(e);
            }
        };

        // Some readers answer the start command with their first batch
        match self.profile.parse_inventory(&reply) {
            Ok(observed) => self.observe(observed),
            Err(e) => debug!(device = %self.device_id(), error = %e, "Scan start reply carried no tags"),
        }

        self.worker.set_scanning(true);
        info!(device = %self.device_id(), "Continuous scan started");
        Ok(())
    }

    /// Stop continuous scanning. Does nothing if no scan is running.
    pub async fn stop_scan(&self) -> Result<()> {
        if !self.scan_active.load(Ordering::Acquire) {
            return Ok(());
        }

        let stop = self.profile.scan_commands().stop;
        self.worker.channel().send(stop).await?;

        self.worker.set_scanning(false);
        self.scan_active.store(false, Ordering::Release);
        info!(device = %self.device_id(), "Continuous scan stopped");
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_active.load(Ordering::Acquire)
    }

    /// Tags currently present, ordered by first sighting.
    pub fn tags(&self) -> Vec<Tag> {
        self.worker.tracker().snapshot()
    }

    /// Register a callback invoked for each event on the delivery thread.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.worker.dispatcher().subscribe(listener)
    }

    /// Receive events through a channel instead of a callback.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        self.worker.dispatcher().subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.worker.dispatcher().unsubscribe(id)
    }

    pub fn state(&self) -> ConnectionState {
        self.worker.current_state()
    }

    pub fn status(&self) -> WorkerStatus {
        self.worker.status()
    }

    pub fn is_connected(&self) -> bool {
        self.worker.is_connected()
    }

    pub fn is_working(&self) -> bool {
        self.worker.is_working()
    }

    /// The underlying worker.
    pub fn worker(&self) -> &ConnectionWorker<T, P> {
        &self.worker
    }

    fn observe(&self, observed: Vec<TagObservation>) {
        for observation in observed {
            if let Some(tag) = self.worker.tracker().observe(observation) {
                self.publish(EventKind::TagArrived { tag });
            }
        }
    }

    fn publish_change(&self, change: &PresenceChange) {
        for tag in &change.departed {
            self.publish(EventKind::TagLost { tag: tag.clone() });
        }
        for tag in &change.arrived {
            self.publish(EventKind::TagArrived { tag: tag.clone() });
        }
        self.publish(EventKind::InventoryUpdated {
            tags: change.present.clone(),
        });
    }

    fn publish(&self, kind: EventKind) {
        self.worker
            .dispatcher()
            .publish(Event::now(self.device_id().clone(), kind));
    }
}
