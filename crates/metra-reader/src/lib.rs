//! Client-side engine for metraTec RFID readers.
//!
//! A [`Reader`] owns one [`ConnectionWorker`]: a tokio task that keeps the
//! transport connected, prepares the device after every connect, serializes
//! commands and turns unsolicited frames into [`Event`]s. Events reach
//! listeners through an [`EventDispatcher`] running on its own thread.
//!
//! ```text
//! Transport ─► Framer ─► ReaderProfile::classify ─┬─► FrameCodec::decode ─► CommandChannel caller
//!                                                 ├─► TagPresenceTracker ─┐
//!                                                 └─► InputDebouncer ─────┴─► EventDispatcher ─► listeners
//! ```
//!
//! Device families plug in through [`ReaderProfile`]: [`AsciiProfile`] for
//! the legacy ASCII protocol, [`AtProfile`] for AT-command readers.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`] with a [`ReaderError`]. Connection
//! loss is never reported as an error to a caller that is not waiting on a
//! command; the worker reconnects with capped exponential backoff and
//! publishes `ConnectionStateChanged` events instead.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod debounce;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod profile;
pub mod queue;
pub mod reader;
pub mod state;
pub mod tracker;
pub mod worker;

pub use backoff::{Backoff, BackoffConfig};
pub use channel::CommandChannel;
pub use config::{DebounceConfig, PrepareConfig, ReaderConfig};
pub use debounce::InputDebouncer;
pub use dispatcher::{EventDispatcher, Listener, ListenerError, SubscriptionId};
pub use error::{ReaderError, Result};
pub use event::{Event, EventKind};
pub use profile::{
    AsciiProfile, AtProfile, FrameContext, FrameKind, PrepareOutcome, ReaderProfile, ScanCommands,
};
pub use queue::{BoundedQueue, OverflowPolicy, PushOutcome};
pub use reader::Reader;
pub use state::{ConnectionState, WorkerStatus};
pub use tracker::{PresenceChange, TagPresenceTracker};
pub use worker::ConnectionWorker;
