//! Latest heading from the sensor-fusion component.
//!
//! The fusion loop calls [`AzimuthCell::publish`] at its own rate; the BLE
//! service reads [`AzimuthCell::get`] when it is allowed to notify.

use core::sync::atomic::{AtomicI32, Ordering};

use crate::context::Context;
use crate::events::Event;

pub struct AzimuthCell {
    angle: AtomicI32,
}

impl AzimuthCell {
    pub const fn new() -> Self {
        Self {
            angle: AtomicI32::new(0),
        }
    }

    /// Heading in whole degrees, `0..360`.
    pub fn get(&self) -> i32 {
        self.angle.load(Ordering::Relaxed)
    }

    /// Store a new heading, mark the sensor present and announce it.
    pub fn publish(&self, degrees: i32, ctx: &Context) {
        let angle = degrees.rem_euclid(360);
        self.angle.store(angle, Ordering::Relaxed);
        ctx.set_has_sensor(true);
        ctx.bus().post(Event::azimuth(angle));
    }
}

impl Default for AzimuthCell {
    fn default() -> Self {
        Self::new()
    }
}
