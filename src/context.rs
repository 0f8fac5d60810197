//! Shared device context.
//!
//! One [`Context`] is built at boot and shared by `Arc` between the GPS
//! worker, the BLE worker and the system worker.  Every field is its own
//! atomic: a reader never sees a half-written location or colour, but no
//! ordering is promised *between* fields.
//!
//! Locations are stored as two packed `i32` micro-degree values in one
//! `AtomicU64`, which also fixes their precision at six decimal places.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::events::{EventBus, EventSource};

// ── Location ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Sentinel for "no spawn point set".
    pub const UNSET: Self = Self {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in [-90, 90] and longitude in [-180, 180], bounds inclusive.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Valid and not the [`UNSET`](Self::UNSET) sentinel.
    pub fn is_configured(&self) -> bool {
        self.is_valid() && *self != Self::UNSET
    }

    fn pack(self) -> u64 {
        let lat = (self.latitude * 1e6).round() as i32;
        let lon = (self.longitude * 1e6).round() as i32;
        (u64::from(lat as u32) << 32) | u64::from(lon as u32)
    }

    fn unpack(raw: u64) -> Self {
        let lat = (raw >> 32) as u32 as i32;
        let lon = raw as u32 as i32;
        Self::new(f64::from(lat) / 1e6, f64::from(lon) / 1e6)
    }
}

// ── Pointer colour ────────────────────────────────────────────

/// Two 24-bit RGB colours for the pointer LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerColor {
    pub south_color: u32,
    pub spawn_color: u32,
}

impl PointerColor {
    pub const RGB_MASK: u32 = 0x00FF_FFFF;

    pub const fn new(south_color: u32, spawn_color: u32) -> Self {
        Self {
            south_color: south_color & Self::RGB_MASK,
            spawn_color: spawn_color & Self::RGB_MASK,
        }
    }

    fn pack(self) -> u64 {
        (u64::from(self.south_color & Self::RGB_MASK) << 32)
            | u64::from(self.spawn_color & Self::RGB_MASK)
    }

    fn unpack(raw: u64) -> Self {
        Self::new((raw >> 32) as u32, raw as u32)
    }
}

impl Default for PointerColor {
    fn default() -> Self {
        // red south needle, green spawn needle
        Self::new(0xFF_0000, 0x00_FF00)
    }
}

// ── Enumerations ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ServerMode {
    Wifi = 0,
    Ble = 1,
}

impl TryFrom<u8> for ServerMode {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            0 => Ok(Self::Wifi),
            1 => Ok(Self::Ble),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Model {
    Lite = 0,
    /// GPS-equipped unit; needs a spawn point before BLE may shut down.
    Gps = 1,
}

impl TryFrom<u8> for Model {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        match raw {
            0 => Ok(Self::Lite),
            1 => Ok(Self::Gps),
            other => Err(other),
        }
    }
}

pub const DEFAULT_BRIGHTNESS: u8 = 16;

// ── Context ───────────────────────────────────────────────────

pub struct Context {
    current_location: AtomicU64,
    spawn_location: AtomicU64,
    color: AtomicU64,
    brightness: AtomicU8,
    server_mode: AtomicU8,
    model: AtomicU8,
    subscribe_source: AtomicU8,
    gps_detected: AtomicBool,
    gps_fixed: AtomicBool,
    has_sensor: AtomicBool,
    bus: &'static EventBus,
}

impl Context {
    pub fn new(bus: &'static EventBus) -> Self {
        Self {
            current_location: AtomicU64::new(Location::UNSET.pack()),
            spawn_location: AtomicU64::new(Location::UNSET.pack()),
            color: AtomicU64::new(PointerColor::default().pack()),
            brightness: AtomicU8::new(DEFAULT_BRIGHTNESS),
            server_mode: AtomicU8::new(ServerMode::Wifi as u8),
            model: AtomicU8::new(Model::Lite as u8),
            subscribe_source: AtomicU8::new(EventSource::Sensor as u8),
            gps_detected: AtomicBool::new(false),
            gps_fixed: AtomicBool::new(false),
            has_sensor: AtomicBool::new(false),
            bus,
        }
    }

    pub fn bus(&self) -> &'static EventBus {
        self.bus
    }

    pub fn location(&self) -> Location {
        Location::unpack(self.current_location.load(Ordering::Acquire))
    }

    pub fn set_location(&self, loc: Location) {
        self.current_location.store(loc.pack(), Ordering::Release);
    }

    pub fn spawn_location(&self) -> Location {
        Location::unpack(self.spawn_location.load(Ordering::Acquire))
    }

    pub fn set_spawn_location(&self, loc: Location) {
        self.spawn_location.store(loc.pack(), Ordering::Release);
    }

    pub fn color(&self) -> PointerColor {
        PointerColor::unpack(self.color.load(Ordering::Acquire))
    }

    pub fn set_color(&self, color: PointerColor) {
        self.color.store(color.pack(), Ordering::Release);
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }

    pub fn set_brightness(&self, value: u8) {
        self.brightness.store(value, Ordering::Relaxed);
    }

    pub fn server_mode(&self) -> ServerMode {
        ServerMode::try_from(self.server_mode.load(Ordering::Relaxed)).unwrap_or(ServerMode::Wifi)
    }

    pub fn set_server_mode(&self, mode: ServerMode) {
        self.server_mode.store(mode as u8, Ordering::Relaxed);
    }

    pub fn model(&self) -> Model {
        Model::try_from(self.model.load(Ordering::Relaxed)).unwrap_or(Model::Lite)
    }

    pub fn set_model(&self, model: Model) {
        self.model.store(model as u8, Ordering::Relaxed);
    }

    pub fn is_gps_model(&self) -> bool {
        self.model() == Model::Gps
    }

    pub fn subscribe_source(&self) -> EventSource {
        EventSource::from_u8(self.subscribe_source.load(Ordering::Relaxed))
            .unwrap_or(EventSource::Sensor)
    }

    pub fn set_subscribe_source(&self, source: EventSource) {
        self.subscribe_source.store(source as u8, Ordering::Relaxed);
    }

    pub fn gps_detected(&self) -> bool {
        self.gps_detected.load(Ordering::Acquire)
    }

    pub fn set_gps_detected(&self, detected: bool) {
        self.gps_detected.store(detected, Ordering::Release);
    }

    pub fn gps_fixed(&self) -> bool {
        self.gps_fixed.load(Ordering::Acquire)
    }

    pub fn set_gps_fixed(&self, fixed: bool) {
        self.gps_fixed.store(fixed, Ordering::Release);
    }

    pub fn has_sensor(&self) -> bool {
        self.has_sensor.load(Ordering::Relaxed)
    }

    pub fn set_has_sensor(&self, present: bool) {
        self.has_sensor.store(present, Ordering::Relaxed);
    }
}
