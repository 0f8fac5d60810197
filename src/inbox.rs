//! Worker inboxes.
//!
//! Each worker owns one bounded channel and drains it on its own thread.
//! Producers (stack callbacks, the UART reader, bus sinks) only ever
//! `try_send`: a full inbox drops the message instead of blocking the
//! producer.
//!
//! Timer expiries do not share that channel.  Each one-shot timer owns a
//! [`Signal`] that its callback raises; the worker's `next_*` future
//! checks the signals before the channel, so a flood of stack or bus
//! traffic can never crowd an expiry out.  A signal raised twice before it
//! is consumed is delivered once.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::warn;

use crate::app::ble_service::BleInput;
use crate::app::gps::GpsInput;
use crate::events::Event;

pub const GPS_INBOX_DEPTH: usize = 16;
pub const BLE_INBOX_DEPTH: usize = 16;
pub const SYSTEM_INBOX_DEPTH: usize = 8;

type Expiry = Signal<CriticalSectionRawMutex, ()>;

/// GPS controller: parsed sentences and disable requests.
pub static GPS_INBOX: Channel<CriticalSectionRawMutex, GpsInput, GPS_INBOX_DEPTH> = Channel::new();

/// BLE service: stack callbacks and bus events.
pub static BLE_INBOX: Channel<CriticalSectionRawMutex, BleInput, BLE_INBOX_DEPTH> = Channel::new();

/// System worker: factory reset, calibration and subscription changes.
pub static SYSTEM_INBOX: Channel<CriticalSectionRawMutex, Event, SYSTEM_INBOX_DEPTH> =
    Channel::new();

pub static GPS_DETECT_EXPIRED: Expiry = Signal::new();
pub static GPS_SLEEP_EXPIRED: Expiry = Signal::new();
pub static BLE_SHUTDOWN_EXPIRED: Expiry = Signal::new();

pub fn post_gps(input: GpsInput) -> bool {
    let ok = GPS_INBOX.try_send(input).is_ok();
    if !ok {
        warn!("GPS: inbox full, {:?} dropped", input);
    }
    ok
}

pub fn post_ble(input: BleInput) -> bool {
    match BLE_INBOX.try_send(input) {
        Ok(()) => true,
        Err(_) => {
            warn!("BLE: inbox full, input dropped");
            false
        }
    }
}

/// Bus sink for the BLE worker.
pub fn deliver_ble(event: Event) -> bool {
    post_ble(BleInput::Dispatch(event))
}

/// Bus sink for the system worker.
pub fn deliver_system(event: Event) -> bool {
    SYSTEM_INBOX.try_send(event).is_ok()
}

/// Next input for the GPS worker.  Pending timer expiries win over queued
/// sentences.
pub async fn next_gps() -> GpsInput {
    let detect = async {
        GPS_DETECT_EXPIRED.wait().await;
        GpsInput::DetectionTimeout
    };
    let sleep = async {
        GPS_SLEEP_EXPIRED.wait().await;
        GpsInput::SleepExpired
    };
    future::or(future::or(detect, sleep), GPS_INBOX.receive()).await
}

/// Next input for the BLE worker.  A pending shutdown expiry wins over
/// queued stack traffic.
pub async fn next_ble() -> BleInput {
    let shutdown = async {
        BLE_SHUTDOWN_EXPIRED.wait().await;
        BleInput::ShutdownTimeout
    };
    future::or(shutdown, BLE_INBOX.receive()).await
}
