//! Sensor subsystem boundary.
//!
//! The magnetometer driver and the tilt-compensated fusion run in their own
//! component; this crate only sees their output through [`AzimuthCell`].

pub mod azimuth;

pub use azimuth::AzimuthCell;
