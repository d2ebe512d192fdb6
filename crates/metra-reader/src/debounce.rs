//! Input pin debouncing.
//!
//! Each pin gets a sampling task the first time it reports a level. The
//! task samples the latest raw level every `interval` and reports a change
//! only after the level has held for `stable`, so contact bounce on a
//! mechanical switch yields a single `InputPinChanged` event.

use metra_core::DeviceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DebounceConfig;
use crate::dispatcher::EventDispatcher;
use crate::event::{Event, EventKind};

struct PinSampler {
    level: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Debounces raw input events before they reach the dispatcher.
pub struct InputDebouncer {
    device_id: DeviceId,
    interval: Duration,
    stable: Duration,
    dispatcher: Arc<EventDispatcher>,
    pins: Mutex<HashMap<u8, PinSampler>>,
    cancel: CancellationToken,
}

impl InputDebouncer {
    pub fn new(device_id: DeviceId, config: DebounceConfig, dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            device_id,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            stable: Duration::from_millis(config.stable_ms),
            dispatcher,
            pins: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<u8, PinSampler>> {
        self.pins.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a raw level reported by the device.
    ///
    /// Must be called from within a tokio runtime.
    pub fn update(&self, pin: u8, high: bool) {
        if self.cancel.is_cancelled() {
            return;
        }

        let mut pins = self.pins();
        if let Some(sampler) = pins.get(&pin) {
            sampler.level.send_replace(high);
            return;
        }

        let (level, receiver) = watch::channel(high);
        let task = tokio::spawn(sample_pin(
            pin,
            receiver,
            self.interval,
            self.stable,
            self.cancel.child_token(),
            {
                let device_id = self.device_id.clone();
                let dispatcher = Arc::clone(&self.dispatcher);
                move |high| {
                    dispatcher.publish(Event::now(
                        device_id.clone(),
                        EventKind::InputPinChanged { pin, high },
                    ))
                }
            },
        ));
        debug!(device = %self.device_id, pin, "Debouncing input pin");
        pins.insert(pin, PinSampler { level, task });
    }

    /// Number of pins with a sampling task.
    pub fn pin_count(&self) -> usize {
        self.pins().len()
    }

    /// Stop all sampling tasks. Levels that have not settled are discarded.
    pub fn stop(&self) {
        self.cancel.cancel();
        for (_, sampler) in self.pins().drain() {
            sampler.task.abort();
        }
    }
}

impl Drop for InputDebouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sample_pin(
    pin: u8,
    mut level: watch::Receiver<bool>,
    interval: Duration,
    stable: Duration,
    cancel: CancellationToken,
    report: impl Fn(bool),
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut candidate = *level.borrow_and_update();
    let mut since = Instant::now();
    let mut reported: Option<bool> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match level.has_changed() {
            Ok(true) => {
                // Any edge restarts the stability window, even one that
                // returned to the candidate level between two samples
                candidate = *level.borrow_and_update();
                since = Instant::now();
                trace!(pin, high = candidate, "Input level changed");
                continue;
            }
            Ok(false) => {}
            Err(_) => break,
        }

        if reported != Some(candidate) && since.elapsed() >= stable {
            reported = Some(candidate);
            report(candidate);
        }
    }
}
