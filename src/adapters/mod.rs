//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements          | Connects to               |
//! |---------------|---------------------|---------------------------|
//! | `ble`         | GattPort            | Bluedroid GATT server     |
//! | `nmea`        | GpsReceiverPort     | GPS UART + NMEA parser    |
//! | `nvs`         | ConfigPort          | NVS / in-memory store     |
//! |               | StoragePort         |                           |
//! | `preferences` | PreferencePort      | any StoragePort           |
//! | `time`        | ClockPort           | ESP32 high-res timer      |

pub mod ble;
pub mod nmea;
pub mod nvs;
pub mod preferences;
pub mod time;
