//! Pointer LED brightness.
//!
//! The LED chain itself is rendered by the display component; this driver
//! only owns the global brightness it reads on every frame.

use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::info;

use crate::app::ports::PixelPort;

#[derive(Clone)]
pub struct PixelDriver {
    brightness: Arc<AtomicU8>,
}

impl PixelDriver {
    pub fn new(initial: u8) -> Self {
        Self {
            brightness: Arc::new(AtomicU8::new(initial)),
        }
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Relaxed)
    }
}

impl PixelPort for PixelDriver {
    fn set_brightness(&mut self, value: u8) {
        self.brightness.store(value, Ordering::Relaxed);
        info!("LED: brightness {}", value);
    }
}
