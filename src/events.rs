//! Event dispatch fabric.
//!
//! Producers (sensor fusion, GPS controller, BLE service) post typed
//! [`Event`]s to the [`EventBus`].  Consumers register a *sink*: a plain
//! function that forwards the event into the consumer's own inbox channel
//! (see [`crate::inbox`]), filtered by [`EventKind`].  Delivery never runs
//! consumer logic on the producer's thread.
//!
//! ```text
//! ┌─────────────┐        ┌────────────┐  sink  ┌─────────────┐
//! │ Sensor      │──post─▶│            │───────▶│ BLE inbox   │
//! │ GPS ctrl    │──post─▶│  EventBus  │───────▶│ System inbox│
//! │ BLE service │──post─▶│            │        └─────────────┘
//! └─────────────┘        └────────────┘
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::warn;

/// Maximum number of concurrent subscriptions.
pub const MAX_SUBSCRIBERS: usize = 8;

// ── Event types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Fresh heading from the sensor-fusion subsystem.
    Azimuth = 0,
    /// Erase preferences and restart.
    FactoryReset = 1,
    /// Start a magnetometer calibration run.
    SensorCalibrate = 2,
    /// The heading source changed (e.g. GPS fix obtained).
    Subscribe = 3,
}

/// Which subsystem produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventSource {
    Ble = 0,
    Sensor = 1,
    Gps = 2,
}

impl EventSource {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Ble),
            1 => Some(Self::Sensor),
            2 => Some(Self::Gps),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPayload {
    None,
    /// Heading in whole degrees.
    Azimuth { angle: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub source: EventSource,
    pub payload: EventPayload,
}

impl Event {
    pub const fn new(kind: EventKind, source: EventSource) -> Self {
        Self {
            kind,
            source,
            payload: EventPayload::None,
        }
    }

    pub const fn azimuth(angle: i32) -> Self {
        Self {
            kind: EventKind::Azimuth,
            source: EventSource::Sensor,
            payload: EventPayload::Azimuth { angle },
        }
    }
}

// ── Subscriptions ─────────────────────────────────────────────

/// Forwards an event into a consumer inbox.  Returns `false` when the
/// inbox is full and the event was dropped.
pub type Sink = fn(Event) -> bool;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u8);

#[derive(Clone, Copy)]
struct Subscription {
    id: SubscriptionId,
    filter: EventKind,
    sink: Sink,
}

/// Errors from [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// All [`MAX_SUBSCRIBERS`] slots are taken.
    Full,
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "subscription table full"),
        }
    }
}

impl std::error::Error for BusError {}

// ── Bus ───────────────────────────────────────────────────────

pub struct EventBus {
    subs: Mutex<CriticalSectionRawMutex, RefCell<heapless::Vec<Subscription, MAX_SUBSCRIBERS>>>,
    next_id: AtomicU8,
}

impl EventBus {
    pub const fn new() -> Self {
        Self {
            subs: Mutex::new(RefCell::new(heapless::Vec::new())),
            next_id: AtomicU8::new(1),
        }
    }

    /// Register `sink` for every event of kind `filter`.
    pub fn subscribe(&self, filter: EventKind, sink: Sink) -> Result<SubscriptionId, BusError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subs.lock(|subs| {
            subs.borrow_mut()
                .push(Subscription { id, filter, sink })
                .map_err(|_| BusError::Full)
        })?;
        Ok(id)
    }

    /// Remove a subscription.  Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subs.lock(|subs| subs.borrow_mut().retain(|s| s.id != id));
    }

    /// Deliver `event` to every matching sink and return how many accepted it.
    ///
    /// Sinks run outside the table lock so a sink may itself post or
    /// (un)subscribe.
    pub fn post(&self, event: Event) -> usize {
        let targets: heapless::Vec<Sink, MAX_SUBSCRIBERS> = self.subs.lock(|subs| {
            subs.borrow()
                .iter()
                .filter(|s| s.filter == event.kind)
                .map(|s| s.sink)
                .collect()
        });

        let mut delivered = 0;
        for sink in targets {
            if sink(event) {
                delivered += 1;
            } else {
                warn!("Bus: {:?} dropped, consumer inbox full", event.kind);
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.lock(|subs| subs.borrow().len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
