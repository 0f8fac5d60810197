//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ GpsController / BleConfigService (domain)
//! ```
//!
//! Driven adapters (GPS power rail, NMEA receiver, timers, GATT server,
//! preference store) implement these traits.  The domain consumes them via
//! generics, so the controllers never touch hardware directly and the
//! integration tests can drive them with recording mocks.
//!
//! Runtime port calls are fire-and-forget: adapters log their own failures
//! and the domain never retries.

use core::time::Duration;

use crate::app::attributes::AttributeId;
use crate::config::{ConnParams, FirmwareConfig};
use crate::context::{Context, Location, Model, PointerColor, ServerMode};

// ───────────────────────────────────────────────────────────────
// GPS ports (domain → GPS hardware)
// ───────────────────────────────────────────────────────────────

/// GPS module power rail.
pub trait GpsPowerPort {
    fn power_on(&mut self);
    fn power_off(&mut self);
    fn is_powered(&self) -> bool;
}

/// NMEA sentence source.  While subscribed, parsed sentences arrive in the
/// GPS inbox as [`GpsInput::Sentence`](crate::app::gps::GpsInput::Sentence).
pub trait GpsReceiverPort {
    /// Start the parser and the UART reader.
    fn subscribe(&mut self);
    /// Stop delivery and release the parser.
    fn unsubscribe(&mut self);
    fn is_subscribed(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Timer port
// ───────────────────────────────────────────────────────────────

/// One-shot alarm whose expiry posts a message to its owner's inbox.
///
/// Re-arming an armed timer restarts it.  Expiry callbacks may race with
/// [`cancel`](Self::cancel); owners re-check their state on expiry.
pub trait OneShotTimer {
    fn arm(&mut self, after: Duration);
    fn cancel(&mut self);
    fn is_armed(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Preference port (domain ↔ persistent user settings)
// ───────────────────────────────────────────────────────────────

/// User settings restored at boot.  `None` means never written.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoredPreferences {
    pub spawn_location: Option<Location>,
    pub pointer_color: Option<PointerColor>,
    pub server_mode: Option<ServerMode>,
    pub brightness: Option<u8>,
    pub model: Option<Model>,
}

impl StoredPreferences {
    /// Copy every stored setting into `ctx`; unset fields keep their defaults.
    pub fn apply_to(&self, ctx: &Context) {
        if let Some(loc) = self.spawn_location {
            ctx.set_spawn_location(loc);
        }
        if let Some(color) = self.pointer_color {
            ctx.set_color(color);
        }
        if let Some(mode) = self.server_mode {
            ctx.set_server_mode(mode);
        }
        if let Some(value) = self.brightness {
            ctx.set_brightness(value);
        }
        if let Some(model) = self.model {
            ctx.set_model(model);
        }
    }
}

/// Persists the settings a BLE peer may change.
pub trait PreferencePort {
    fn save_spawn_location(&mut self, loc: Location);
    fn save_pointer_color(&mut self, color: PointerColor);
    fn set_server_mode(&mut self, mode: ServerMode);
    fn set_brightness(&mut self, value: u8);
    fn set_model(&mut self, model: Model);
    fn load(&self) -> StoredPreferences;
    /// Erase every stored setting (factory reset).
    fn clear(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Output ports
// ───────────────────────────────────────────────────────────────

/// Pointer LED driver.
pub trait PixelPort {
    fn set_brightness(&mut self, value: u8);
}

/// Monotonic milliseconds since boot.
pub trait ClockPort {
    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// GATT port (domain → BLE host stack)
// ───────────────────────────────────────────────────────────────

/// Identity of a connected BLE central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub conn_id: u16,
    pub address: [u8; 6],
}

/// Attribute table and radio control, as seen by the configuration service.
pub trait GattPort {
    /// Replace the value served for reads of `attr`.
    fn set_value(&mut self, attr: AttributeId, value: &[u8]);
    /// Push the current value of `attr` to every subscribed peer.
    fn notify(&mut self, attr: AttributeId);
    fn update_conn_params(&mut self, peer: &PeerInfo, params: &ConnParams);
    fn start_advertising(&mut self);
    /// Tear down the host stack and disable the radio controller.
    fn shutdown(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists firmware configuration.
///
/// Implementations MUST validate before persisting and reject invalid
/// ranges with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Returns [`FirmwareConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<FirmwareConfig, ConfigError>;

    fn save(&self, config: &FirmwareConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced; namespaces and keys are at most 15 bytes (NVS
/// limit).  Writes are atomic per key.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
