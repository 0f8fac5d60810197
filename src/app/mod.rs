//! Application core: domain logic behind port traits.
//!
//! The GPS duty-cycle controller, the distance-to-sleep policy and the BLE
//! configuration service.  All interaction with hardware happens through
//! the traits in [`ports`], so everything here runs unchanged in host
//! tests.

pub mod attributes;
pub mod ble_service;
pub mod device_info;
pub mod geo;
pub mod gps;
pub mod policy;
pub mod ports;
