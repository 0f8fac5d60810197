//! Unified error types for the MCompass firmware.
//!
//! Boot-time failures (storage, radio, timers, peripherals) funnel into
//! [`Error`] so `main` can report them uniformly.  Runtime faults on the
//! GPS and BLE paths are logged and absorbed where they occur; only
//! initialisation errors travel this far.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Non-volatile storage could not be opened or written.
    Storage(StorageFault),
    /// The BLE stack rejected a call.
    Ble(BleFault),
    /// An ESP-IDF service call (timer, UART, GPIO driver) failed.
    Esp(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Ble(e) => write!(f, "ble: {e}"),
            Self::Esp(code) => write!(f, "esp-idf: error {code}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFault {
    /// `nvs_flash_init` failed even after an erase.
    FlashInit(i32),
}

impl fmt::Display for StorageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlashInit(code) => write!(f, "flash init failed ({code})"),
        }
    }
}

impl From<StorageFault> for Error {
    fn from(e: StorageFault) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// BLE faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleFault {
    ControllerInit(i32),
    ControllerEnable(i32),
    BluedroidInit(i32),
    BluedroidEnable(i32),
    Register(i32),
}

impl fmt::Display for BleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControllerInit(c) => write!(f, "bt_controller_init failed ({c})"),
            Self::ControllerEnable(c) => write!(f, "bt_controller_enable failed ({c})"),
            Self::BluedroidInit(c) => write!(f, "bluedroid_init failed ({c})"),
            Self::BluedroidEnable(c) => write!(f, "bluedroid_enable failed ({c})"),
            Self::Register(c) => write!(f, "callback registration failed ({c})"),
        }
    }
}

impl From<BleFault> for Error {
    fn from(e: BleFault) -> Self {
        Self::Ble(e)
    }
}

#[cfg(target_os = "espidf")]
impl From<esp_idf_svc::sys::EspError> for Error {
    fn from(e: esp_idf_svc::sys::EspError) -> Self {
        Self::Esp(e.code())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
