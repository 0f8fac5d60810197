//! Firmware configuration parameters
//!
//! Tunables for the GPS duty cycle and the BLE configuration server.
//! Values can be overridden via an NVS blob written at the factory; user
//! settings (spawn location, colours, brightness) live in
//! [`Preferences`](crate::adapters::preferences::Preferences) instead.

use serde::{Deserialize, Serialize};

/// BLE connection parameters requested from a freshly connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnParams {
    /// Minimum connection interval, 1.25 ms units.
    pub min_interval: u16,
    /// Maximum connection interval, 1.25 ms units.
    pub max_interval: u16,
    /// Slave latency in connection events.
    pub latency: u16,
    /// Supervision timeout, 10 ms units.
    pub timeout: u16,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            min_interval: 80,  // 100 ms
            max_interval: 100, // 125 ms
            latency: 4,
            timeout: 200, // 2 s
        }
    }
}

/// Core firmware configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareConfig {
    // --- BLE ---
    /// Advertised GAP device name
    pub device_name: heapless::String<16>,
    /// Preferred ATT MTU
    pub ble_mtu: u16,
    /// Seconds after boot before the BLE server may shut itself down
    pub ble_server_timeout_secs: u32,
    /// Minimum gap between two azimuth notifications (milliseconds)
    pub notify_interval_ms: u32,
    /// Connection parameters requested on connect
    pub conn_params: ConnParams,

    // --- GPS ---
    /// Seconds to wait for the first NMEA sentence before powering down
    pub gps_detect_timeout_secs: u32,
    /// GPS module UART baud rate
    pub gps_uart_baud: u32,
    /// Emit fix diagnostics once every N updates
    pub gps_log_every: u32,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        let mut device_name = heapless::String::new();
        // "MCOMPASS" fits in 16 bytes
        let _ = device_name.push_str("MCOMPASS");

        Self {
            // BLE
            device_name,
            ble_mtu: 255,
            ble_server_timeout_secs: 60,
            notify_interval_ms: 1000,
            conn_params: ConnParams::default(),

            // GPS
            gps_detect_timeout_secs: 30,
            gps_uart_baud: 9600,
            gps_log_every: 10,
        }
    }
}
