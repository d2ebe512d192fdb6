//! Event delivery to listeners.
//!
//! ```text
//! worker task ──publish──> BoundedQueue ──pop──> delivery thread ──> listener 1
//! debouncer   ──publish──>  (drop oldest)                        ──> listener 2
//! ```
//!
//! Publishing never blocks. A single OS thread invokes the listeners, one
//! event at a time, in publish order. A failing or panicking listener is
//! logged and skipped; it does not affect other listeners or later events.
//!
//! Closing the queue is the shutdown sentinel: the thread delivers every
//! event queued before the close and then exits.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::event::Event;
use crate::queue::{BoundedQueue, OverflowPolicy, PushOutcome};

/// Error a listener may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked for each event on the delivery thread.
pub type Listener = Arc<dyn Fn(&Event) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Listeners = Arc<RwLock<Vec<(SubscriptionId, Listener)>>>;

/// Queue plus delivery thread for one device's events.
pub struct EventDispatcher {
    name: String,
    queue: Arc<BoundedQueue<Event>>,
    listeners: Listeners,
    thread: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl EventDispatcher {
    /// Create a stopped dispatcher. Events published before
    /// [`start`](Self::start) are kept (up to `capacity`).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(BoundedQueue::new(capacity, OverflowPolicy::DropOldest)),
            listeners: Arc::new(RwLock::new(Vec::new())),
            thread: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// Start the delivery thread. Starting a running dispatcher is a no-op.
    ///
    /// # Errors
    /// Fails if the OS refuses to spawn the thread.
    pub fn start(&self) -> std::io::Result<()> {
        let mut thread = self.thread.lock().unwrap_or_else(|p| p.into_inner());
        if thread.is_some() {
            return Ok(());
        }

        if self.queue.is_closed() {
            self.queue.reopen();
        }

        let queue = Arc::clone(&self.queue);
        let listeners = Arc::clone(&self.listeners);
        let name = self.name.clone();
        *thread = Some(
            std::thread::Builder::new()
                .name(format!("events-{}", self.name))
                .spawn(move || deliver_loop(&name, &queue, &listeners))?,
        );

        debug!(device = %self.name, "Event dispatcher started");
        Ok(())
    }

    /// Deliver everything published so far, then stop the thread.
    ///
    /// Blocks until the thread has exited. Stopping a stopped dispatcher
    /// is a no-op.
    pub fn stop(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.queue.close();
        if handle.join().is_err() {
            warn!(device = %self.name, "Event delivery thread panicked");
        }
        debug!(device = %self.name, "Event dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Queue an event for delivery. Never blocks.
    pub fn publish(&self, event: Event) {
        let kind = event.kind.name();
        match self.queue.push(event) {
            PushOutcome::Queued => trace!(device = %self.name, kind, "Event queued"),
            PushOutcome::DroppedOldest | PushOutcome::DroppedNewest => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(device = %self.name, kind, dropped, "Event queue full, dropped an event");
            }
            PushOutcome::Closed => debug!(device = %self.name, kind, "Dispatcher stopped, event discarded"),
        }
    }

    /// Register a listener.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, Arc::new(listener)));
        debug!(device = %self.name, subscription = %id, "Listener subscribed");
        id
    }

    /// Receive events on a tokio channel instead of a callback.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            // A dropped receiver just stops listening
            let _ = tx.send(event.clone());
            Ok(())
        });
        (id, rx)
    }

    /// Remove a listener; returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|p| p.into_inner());
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Events lost to queue overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("name", &self.name)
            .field("queued", &self.queue.len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn deliver_loop(name: &str, queue: &BoundedQueue<Event>, listeners: &Listeners) {
    while let Some(event) = queue.pop() {
        // Snapshot so listeners may (un)subscribe without deadlocking
        let current: Vec<(SubscriptionId, Listener)> = listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        for (id, listener) in current {
            match catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    device = name,
                    subscription = %id,
                    kind = event.kind.name(),
                    error = %e,
                    "Listener failed"
                ),
                Err(panic) => warn!(
                    device = name,
                    subscription = %id,
                    kind = event.kind.name(),
                    panic = panic_message(panic.as_ref()),
                    "Listener panicked"
                ),
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
