//! Mock adapters for integration tests.
//!
//! Every port call is recorded so tests can assert on the full history
//! without a radio, a UART or flash.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcompass::app::attributes::AttributeId;
use mcompass::app::ports::{
    ClockPort, GattPort, GpsPowerPort, GpsReceiverPort, OneShotTimer, PeerInfo, PixelPort,
    PreferencePort, StoredPreferences,
};
use mcompass::config::ConnParams;
use mcompass::context::{Context, Location, Model, PointerColor, ServerMode};
use mcompass::events::EventBus;

/// Fresh context on its own leaked bus, so tests never share subscribers.
pub fn context() -> Arc<Context> {
    Arc::new(Context::new(Box::leak(Box::new(EventBus::new()))))
}

// ── GPS side ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockRail {
    pub powered: bool,
    /// `true` for every power-on, `false` for every power-off.
    pub history: Vec<bool>,
}

impl GpsPowerPort for MockRail {
    fn power_on(&mut self) {
        self.powered = true;
        self.history.push(true);
    }

    fn power_off(&mut self) {
        self.powered = false;
        self.history.push(false);
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}

#[derive(Debug, Default)]
pub struct MockReceiver {
    pub subscribed: bool,
    pub unsubscribe_calls: u32,
}

impl GpsReceiverPort for MockReceiver {
    fn subscribe(&mut self) {
        self.subscribed = true;
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
        self.unsubscribe_calls += 1;
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

#[derive(Debug, Default)]
pub struct MockTimer {
    pub armed: Option<Duration>,
    pub arm_calls: Vec<Duration>,
    pub cancel_calls: u32,
}

impl OneShotTimer for MockTimer {
    fn arm(&mut self, after: Duration) {
        self.armed = Some(after);
        self.arm_calls.push(after);
    }

    fn cancel(&mut self) {
        self.armed = None;
        self.cancel_calls += 1;
    }

    fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

// ── BLE side ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockGatt {
    pub values: HashMap<AttributeId, Vec<u8>>,
    pub notified: Vec<(AttributeId, Vec<u8>)>,
    pub conn_updates: Vec<(u16, ConnParams)>,
    pub advertising_starts: u32,
    pub shut_down: bool,
}

#[allow(dead_code)]
impl MockGatt {
    pub fn value(&self, attr: AttributeId) -> &[u8] {
        self.values.get(&attr).map_or(&[], Vec::as_slice)
    }

    pub fn text(&self, attr: AttributeId) -> &str {
        std::str::from_utf8(self.value(attr)).unwrap()
    }
}

impl GattPort for MockGatt {
    fn set_value(&mut self, attr: AttributeId, value: &[u8]) {
        self.values.insert(attr, value.to_vec());
    }

    fn notify(&mut self, attr: AttributeId) {
        let current = self.value(attr).to_vec();
        self.notified.push((attr, current));
    }

    fn update_conn_params(&mut self, peer: &PeerInfo, params: &ConnParams) {
        self.conn_updates.push((peer.conn_id, *params));
    }

    fn start_advertising(&mut self) {
        self.advertising_starts += 1;
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }
}

#[derive(Debug, Default)]
pub struct MockPrefs {
    pub stored: StoredPreferences,
    pub writes: u32,
    pub cleared: bool,
}

impl PreferencePort for MockPrefs {
    fn save_spawn_location(&mut self, loc: Location) {
        self.stored.spawn_location = Some(loc);
        self.writes += 1;
    }

    fn save_pointer_color(&mut self, color: PointerColor) {
        self.stored.pointer_color = Some(color);
        self.writes += 1;
    }

    fn set_server_mode(&mut self, mode: ServerMode) {
        self.stored.server_mode = Some(mode);
        self.writes += 1;
    }

    fn set_brightness(&mut self, value: u8) {
        self.stored.brightness = Some(value);
        self.writes += 1;
    }

    fn set_model(&mut self, model: Model) {
        self.stored.model = Some(model);
        self.writes += 1;
    }

    fn load(&self) -> StoredPreferences {
        self.stored
    }

    fn clear(&mut self) {
        self.stored = StoredPreferences::default();
        self.cleared = true;
    }
}

#[derive(Debug, Default)]
pub struct MockPixel {
    pub brightness: Option<u8>,
}

impl PixelPort for MockPixel {
    fn set_brightness(&mut self, value: u8) {
        self.brightness = Some(value);
    }
}

/// Clock the test advances by hand.
#[derive(Debug, Default)]
pub struct MockClock {
    pub now_ms: u64,
}

impl ClockPort for MockClock {
    fn uptime_ms(&self) -> u64 {
        self.now_ms
    }
}
