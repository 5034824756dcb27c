//! In-process telemetry bus: multi-producer, multi-subscriber, non-blocking.
//!
//! Every subscriber owns a bounded queue. `publish` never blocks and never
//! waits on a subscriber: a full queue drops its oldest event to make room,
//! so a stalled transport cannot delay the control loop. Events are value
//! snapshots; nothing shared-mutable crosses the bus.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;

use crate::status::ControllerSnapshot;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Where a pulse edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseSource {
    HardwareInterrupt,
    Simulation,
}

#[derive(Debug, Clone, Serialize)]
pub struct PwmUpdated {
    pub pin: u8,
    pub duty: u8,
    pub frequency_hz: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PulseObserved {
    pub sensor_id: u8,
    pub pin: u8,
    pub pulse_count: u64,
    pub rate_pps: f64,
    pub filtered_rpm: f64,
    pub wall_ms: u64,
    pub source: PulseSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorState {
    pub sensor_id: u8,
    pub enabled: bool,
}

/// Everything the core broadcasts. External transports subscribe and
/// serialize; the tagged representation is the wire schema.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PwmUpdated(PwmUpdated),
    PulseObserved(PulseObserved),
    SensorState(SensorState),
    ControllerStatus(ControllerSnapshot),
}

struct Subscriber {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    // Liveness token; when the stream is gone the subscriber is pruned on
    // the next publish.
    alive: Weak<()>,
}

/// One subscriber's end of the bus.
pub struct EventStream {
    rx: Receiver<Event>,
    _token: Arc<()>,
}

impl EventStream {
    /// Non-blocking read of the next queued event.
    pub fn try_next(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Blocking read with a deadline; None on timeout.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventStream {
        self.subscribe_with_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn subscribe_with_depth(&self, depth: usize) -> EventStream {
        let (tx, rx) = bounded(depth.max(1));
        let token = Arc::new(());
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscriber {
            tx,
            rx: rx.clone(),
            alive: Arc::downgrade(&token),
        });
        EventStream { rx, _token: token }
    }

    /// Fan the event out to every live subscriber. Never blocks: a full
    /// queue loses its oldest entry.
    pub fn publish(&self, event: Event) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.alive.strong_count() > 0);
        for sub in subs.iter() {
            let mut pending = event.clone();
            loop {
                match sub.tx.try_send(pending) {
                    Ok(()) => break,
                    Err(TrySendError::Full(ev)) => {
                        // Drop-oldest: the subscriber keeps the freshest view.
                        if sub.rx.try_recv().is_err() {
                            break;
                        }
                        pending = ev;
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
    }

    /// Number of live subscribers (diagnostics).
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.alive.strong_count() > 0);
        subs.len()
    }
}
