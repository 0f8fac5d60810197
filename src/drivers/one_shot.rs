//! One-shot timers.
//!
//! - **`target_os = "espidf"`**: an `esp_timer` dispatched on the timer
//!   task.  The expiry callback must only raise a signal.
//! - **all other targets**: nothing fires on its own; [`OneShot::expire`]
//!   runs the callback if the timer is armed.

use core::time::Duration;

use log::warn;

use crate::app::ports::OneShotTimer;
use crate::error::Error;

#[cfg(target_os = "espidf")]
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};

#[cfg(target_os = "espidf")]
pub struct OneShot {
    name: &'static str,
    timer: EspTimer<'static>,
}

#[cfg(target_os = "espidf")]
impl OneShot {
    pub fn new(
        service: &EspTaskTimerService,
        name: &'static str,
        on_expiry: impl FnMut() + Send + 'static,
    ) -> Result<Self, Error> {
        let timer = service.timer(on_expiry)?;
        Ok(Self { name, timer })
    }
}

#[cfg(target_os = "espidf")]
impl OneShotTimer for OneShot {
    fn arm(&mut self, after: Duration) {
        if let Err(e) = self.timer.cancel().and_then(|_| self.timer.after(after)) {
            warn!("Timer '{}': arm failed: {}", self.name, e);
        }
    }

    fn cancel(&mut self) {
        if let Err(e) = self.timer.cancel() {
            warn!("Timer '{}': cancel failed: {}", self.name, e);
        }
    }

    fn is_armed(&self) -> bool {
        self.timer.is_scheduled().unwrap_or(false)
    }
}

#[cfg(not(target_os = "espidf"))]
pub struct OneShot {
    name: &'static str,
    deadline: Option<Duration>,
    on_expiry: Box<dyn FnMut() + Send>,
}

#[cfg(not(target_os = "espidf"))]
impl OneShot {
    pub fn new(name: &'static str, on_expiry: impl FnMut() + Send + 'static) -> Result<Self, Error> {
        Ok(Self {
            name,
            deadline: None,
            on_expiry: Box::new(on_expiry),
        })
    }

    /// Delay requested by the last [`arm`](OneShotTimer::arm), if armed.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Fire now.  Returns `false` when the timer was not armed.
    pub fn expire(&mut self) -> bool {
        if self.deadline.take().is_none() {
            warn!("Timer '{}': expire while idle", self.name);
            return false;
        }
        (self.on_expiry)();
        true
    }
}

#[cfg(not(target_os = "espidf"))]
impl OneShotTimer for OneShot {
    fn arm(&mut self, after: Duration) {
        self.deadline = Some(after);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}
