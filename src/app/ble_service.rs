//! BLE configuration service.
//!
//! Domain side of the GATT server: validates and applies peer writes,
//! publishes read-back values, rate-limits azimuth notifications and owns
//! the auto-shutdown timer.  The GATT adapter turns stack callbacks into
//! [`BleInput`] messages; the BLE worker feeds them to
//! [`BleConfigService::handle`] one at a time.
//!
//! ```text
//!  Bluedroid cb ──┐
//!  EventBus sink ─┴─▶ BLE inbox ─┐
//!  shutdown timer ─▶ signal ─────┴─▶ BleConfigService ──▶ GattPort
//!                                      │  │
//!                                      │  └──▶ PreferencePort, PixelPort
//!                                      └──▶ Context, EventBus
//! ```
//!
//! Write pipeline: validate → parse → persist → mutate Context.  After every
//! write, accepted or not, the attribute value is re-rendered from Context,
//! so a rejected write leaves the read-back unchanged.

use std::sync::Arc;

use core::time::Duration;
use log::{debug, info, warn};

use crate::app::attributes::{self, AttributeId, PayloadError};
use crate::app::device_info::DeviceInfo;
use crate::app::ports::{
    ClockPort, GattPort, OneShotTimer, PeerInfo, PixelPort, PreferencePort,
};
use crate::config::{ConnParams, FirmwareConfig};
use crate::context::Context;
use crate::events::{Event, EventKind, EventSource, Sink, SubscriptionId};
use crate::sensors::AzimuthCell;

/// Largest write payload forwarded from the stack.
pub const MAX_WRITE_LEN: usize = 128;

// ── Inputs ────────────────────────────────────────────────────

/// Messages accepted by the BLE worker.
#[derive(Debug, Clone, PartialEq)]
pub enum BleInput {
    Connected(PeerInfo),
    Disconnected(PeerInfo),
    Write {
        attr: AttributeId,
        data: heapless::Vec<u8, MAX_WRITE_LEN>,
    },
    Read(AttributeId),
    MtuChanged { conn_id: u16, mtu: u16 },
    /// CCCD write: bit 0 = notifications, bit 1 = indications.
    Subscribed {
        conn_id: u16,
        attr: AttributeId,
        value: u16,
    },
    /// Stack status for a notification we sent.
    NotifyStatus(i32),
    Dispatch(Event),
    ShutdownTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    /// Stack torn down.  One-way until reboot.
    Shutdown,
}

/// Driven adapters used by the service.
pub struct BlePorts<G, S, X, C, T> {
    pub gatt: G,
    pub prefs: S,
    pub pixel: X,
    pub clock: C,
    pub shutdown_timer: T,
}

// ── Service ───────────────────────────────────────────────────

pub struct BleConfigService<G, S, X, C, T> {
    ports: BlePorts<G, S, X, C, T>,
    ctx: Arc<Context>,
    azimuth: Arc<AzimuthCell>,
    sink: Sink,
    subscription: Option<SubscriptionId>,
    state: ServiceState,
    connected: u8,
    last_notify_ms: Option<u64>,
    notify_interval_ms: u64,
    conn_params: ConnParams,
    shutdown_after: Duration,
}

impl<G, S, X, C, T> BleConfigService<G, S, X, C, T>
where
    G: GattPort,
    S: PreferencePort,
    X: PixelPort,
    C: ClockPort,
    T: OneShotTimer,
{
    /// `sink` forwards azimuth events from the bus into this service's inbox.
    pub fn new(
        ports: BlePorts<G, S, X, C, T>,
        ctx: Arc<Context>,
        azimuth: Arc<AzimuthCell>,
        sink: Sink,
        config: &FirmwareConfig,
    ) -> Self {
        Self {
            ports,
            ctx,
            azimuth,
            sink,
            subscription: None,
            state: ServiceState::Idle,
            connected: 0,
            last_notify_ms: None,
            notify_interval_ms: u64::from(config.notify_interval_ms),
            conn_params: config.conn_params,
            shutdown_after: Duration::from_secs(u64::from(config.ble_server_timeout_secs)),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn connected_count(&self) -> u8 {
        self.connected
    }

    pub fn ports(&self) -> &BlePorts<G, S, X, C, T> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut BlePorts<G, S, X, C, T> {
        &mut self.ports
    }

    /// Publish initial values, advertise, subscribe to azimuth events and
    /// arm the shutdown timer.
    pub fn start(&mut self) {
        if self.state != ServiceState::Idle {
            return;
        }
        for attr in AttributeId::ALL {
            self.refresh(attr);
        }
        self.ports.gatt.start_advertising();

        match self.ctx.bus().subscribe(EventKind::Azimuth, self.sink) {
            Ok(id) => self.subscription = Some(id),
            Err(e) => warn!("BLE: azimuth subscription failed: {}", e),
        }

        self.ports.shutdown_timer.arm(self.shutdown_after);
        self.state = ServiceState::Running;
        info!(
            "BLE: advertising started, auto-shutdown in {}s",
            self.shutdown_after.as_secs()
        );
    }

    pub fn handle(&mut self, input: BleInput) {
        if self.state == ServiceState::Shutdown {
            debug!("BLE: input after shutdown ignored");
            return;
        }
        match input {
            BleInput::Connected(peer) => self.on_connect(&peer),
            BleInput::Disconnected(peer) => self.on_disconnect(&peer),
            BleInput::Write { attr, data } => self.on_write(attr, &data),
            BleInput::Read(attr) => self.on_read(attr),
            BleInput::MtuChanged { conn_id, mtu } => {
                info!("BLE: MTU updated to {} for conn {}", mtu, conn_id);
            }
            BleInput::Subscribed {
                conn_id,
                attr,
                value,
            } => self.on_subscribe(conn_id, attr, value),
            BleInput::NotifyStatus(code) => {
                debug!("BLE: notification status {}", code);
            }
            BleInput::Dispatch(event) => self.on_dispatch(event),
            BleInput::ShutdownTimeout => self.on_shutdown_timeout(),
        }
    }

    // ── Connection lifecycle ──────────────────────────────────

    pub fn on_connect(&mut self, peer: &PeerInfo) {
        self.connected = self.connected.saturating_add(1);
        self.ports.gatt.update_conn_params(peer, &self.conn_params);
        info!(
            "BLE: client {} connected (conn {}, {} total)",
            MacFmt(&peer.address),
            peer.conn_id,
            self.connected
        );
    }

    pub fn on_disconnect(&mut self, peer: &PeerInfo) {
        self.connected = self.connected.saturating_sub(1);
        info!(
            "BLE: client {} disconnected, restarting advertising",
            MacFmt(&peer.address)
        );
        if self.state == ServiceState::Running {
            self.ports.gatt.start_advertising();
        }
    }

    fn on_subscribe(&mut self, conn_id: u16, attr: AttributeId, value: u16) {
        let what = match value {
            0 => "unsubscribed from",
            1 => "subscribed to notifications for",
            2 => "subscribed to indications for",
            _ => "subscribed to notifications and indications for",
        };
        info!("BLE: conn {} {} {}", conn_id, what, attr.name());
    }

    pub fn on_read(&mut self, attr: AttributeId) {
        info!("BLE: {} read", attr.name());
    }

    // ── Writes ────────────────────────────────────────────────

    pub fn on_write(&mut self, attr: AttributeId, data: &[u8]) {
        info!("BLE: {} write '{}'", attr.name(), Printable(data));

        match attr {
            AttributeId::Spawn => self.write_spawn(data),
            AttributeId::Color => self.write_color(data),
            AttributeId::Brightness => self.write_brightness(data),
            AttributeId::ServerMode => self.write_server_mode(data),
            AttributeId::CustomModel => self.write_model(data),
            AttributeId::Reboot => self.post(EventKind::FactoryReset),
            AttributeId::Calibrate => self.post(EventKind::SensorCalibrate),
            AttributeId::VirtualAzimuth | AttributeId::VirtualLocation => {}
            AttributeId::DeviceInfo => debug!("BLE: Info write ignored"),
            AttributeId::Azimuth => warn!("BLE: Azimuth is read-only"),
        }

        self.refresh(attr);
    }

    fn write_spawn(&mut self, data: &[u8]) {
        match attributes::parse_spawn(data) {
            Ok(loc) => {
                self.ports.prefs.save_spawn_location(loc);
                self.ctx.set_spawn_location(loc);
                info!(
                    "BLE: spawn saved lat={:.6} lon={:.6}",
                    loc.latitude, loc.longitude
                );
            }
            Err(e) => reject(AttributeId::Spawn, e),
        }
    }

    fn write_color(&mut self, data: &[u8]) {
        let update = match attributes::parse_color(data) {
            Ok(u) => u,
            Err(e) => return reject(AttributeId::Color, e),
        };
        if let Some(Err(e)) = update.south {
            warn!("BLE: south colour rejected: {}", e);
        }
        if let Some(Err(e)) = update.spawn {
            warn!("BLE: spawn colour rejected: {}", e);
        }

        match update.merge(self.ctx.color()) {
            Some(color) => {
                self.ports.prefs.save_pointer_color(color);
                self.ctx.set_color(color);
            }
            None => warn!("BLE: no colour field parsed, write discarded"),
        }
    }

    fn write_brightness(&mut self, data: &[u8]) {
        match attributes::parse_brightness(data) {
            Ok(value) => {
                self.ports.prefs.set_brightness(value);
                self.ctx.set_brightness(value);
                self.ports.pixel.set_brightness(value);
            }
            Err(e) => reject(AttributeId::Brightness, e),
        }
    }

    fn write_server_mode(&mut self, data: &[u8]) {
        match attributes::parse_server_mode(data) {
            Ok(mode) => {
                self.ports.prefs.set_server_mode(mode);
                self.ctx.set_server_mode(mode);
            }
            Err(e) => reject(AttributeId::ServerMode, e),
        }
    }

    fn write_model(&mut self, data: &[u8]) {
        match attributes::parse_model(data) {
            Ok(model) => {
                self.ports.prefs.set_model(model);
                self.ctx.set_model(model);
                self.refresh(AttributeId::DeviceInfo);
            }
            Err(e) => reject(AttributeId::CustomModel, e),
        }
    }

    fn post(&self, kind: EventKind) {
        let delivered = self.ctx.bus().post(Event::new(kind, EventSource::Ble));
        if delivered == 0 {
            warn!("BLE: {:?} had no consumer", kind);
        }
    }

    // ── Notifications ─────────────────────────────────────────

    pub fn on_dispatch(&mut self, event: Event) {
        if self.state != ServiceState::Running || event.kind != EventKind::Azimuth {
            return;
        }
        if self.connected == 0 {
            return;
        }

        let now = self.ports.clock.uptime_ms();
        if let Some(last) = self.last_notify_ms {
            if now.saturating_sub(last) < self.notify_interval_ms {
                return;
            }
        }
        self.last_notify_ms = Some(now);

        self.refresh(AttributeId::Azimuth);
        self.ports.gatt.notify(AttributeId::Azimuth);
        self.refresh(AttributeId::DeviceInfo);
        debug!("BLE: notified azimuth {}", self.azimuth.get());
    }

    // ── Shutdown ──────────────────────────────────────────────

    pub fn on_shutdown_timeout(&mut self) {
        if self.state != ServiceState::Running {
            return;
        }
        if self.connected > 0 {
            info!("BLE: client connected, skip deinit");
            return;
        }
        if self.ctx.is_gps_model() && !self.ctx.spawn_location().is_configured() {
            info!("BLE: spawn location not set, skip deinit");
            return;
        }

        warn!("BLE: no client connected, deinit");
        if let Some(id) = self.subscription.take() {
            self.ctx.bus().unsubscribe(id);
        }
        self.ports.shutdown_timer.cancel();
        self.ports.gatt.shutdown();
        self.state = ServiceState::Shutdown;
    }

    // ── Read-back values ──────────────────────────────────────

    fn refresh(&mut self, attr: AttributeId) {
        let ctx = &self.ctx;
        let gatt = &mut self.ports.gatt;
        match attr {
            AttributeId::Spawn => {
                let s = attributes::format_spawn(&ctx.spawn_location());
                gatt.set_value(attr, s.as_bytes());
            }
            AttributeId::Color => {
                let s = attributes::format_color(&ctx.color());
                gatt.set_value(attr, s.as_bytes());
            }
            AttributeId::Brightness => gatt.set_value(attr, &[ctx.brightness()]),
            AttributeId::ServerMode => gatt.set_value(attr, &[ctx.server_mode() as u8]),
            AttributeId::CustomModel => gatt.set_value(attr, &[ctx.model() as u8]),
            AttributeId::Azimuth => gatt.set_value(attr, &self.azimuth.get().to_le_bytes()),
            AttributeId::DeviceInfo => {
                gatt.set_value(attr, &DeviceInfo::snapshot(ctx).to_json());
            }
            AttributeId::Calibrate
            | AttributeId::Reboot
            | AttributeId::VirtualAzimuth
            | AttributeId::VirtualLocation => {}
        }
    }
}

fn reject(attr: AttributeId, e: PayloadError) {
    warn!("BLE: {} write rejected: {}", attr.name(), e);
}

// ── Log formatting helpers ────────────────────────────────────

struct MacFmt<'a>(&'a [u8; 6]);

impl core::fmt::Display for MacFmt<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let a = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// Payload as text when printable, hex bytes otherwise.
struct Printable<'a>(&'a [u8]);

impl core::fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => f.write_str(s),
            _ => {
                for b in self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}
