//! GPS module power rail.
//!
//! The module's enable line is active LOW: driving it low powers the
//! receiver.  Generic over [`OutputPin`] so host tests can swap in a
//! recording pin; on the device it is an `esp_idf_hal` `PinDriver`.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::GpsPowerPort;

pub struct GpioPowerRail<P> {
    pin: P,
    powered: bool,
}

impl<P: OutputPin> GpioPowerRail<P> {
    /// Take the pin and start with the module unpowered.
    pub fn new(mut pin: P) -> Self {
        if pin.set_high().is_err() {
            warn!("GPS: enable line init failed");
        }
        Self {
            pin,
            powered: false,
        }
    }
}

impl<P: OutputPin> GpsPowerPort for GpioPowerRail<P> {
    fn power_on(&mut self) {
        match self.pin.set_low() {
            Ok(()) => {
                if !self.powered {
                    debug!("GPS: rail on");
                }
                self.powered = true;
            }
            Err(_) => warn!("GPS: enable line write failed"),
        }
    }

    fn power_off(&mut self) {
        match self.pin.set_high() {
            Ok(()) => {
                if self.powered {
                    debug!("GPS: rail off");
                }
                self.powered = false;
            }
            Err(_) => warn!("GPS: enable line write failed"),
        }
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}
