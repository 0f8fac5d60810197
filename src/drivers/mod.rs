//! Peripheral drivers and thread helpers.

pub mod gps_power;
pub mod one_shot;
pub mod pixel;
pub mod worker;
