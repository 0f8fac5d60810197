//! NMEA receiver adapter.
//!
//! Implements [`GpsReceiverPort`].  While subscribed, a reader thread pulls
//! bytes from the GPS UART, runs them through a GGA-only `nmea0183` parser
//! and posts each classified sentence to the GPS inbox.  Unsubscribing stops
//! the thread and drops the parser with it.
//!
//! On the host there is no UART: [`NmeaReceiver::feed`] parses a byte slice
//! directly so the classification can be tested.

use log::debug;
use nmea0183::{ParseResult, Parser, Sentence};

use crate::app::gps::{FixReport, GpsEvent};
#[cfg(not(target_os = "espidf"))]
use crate::app::ports::GpsReceiverPort;
use crate::context::Location;

fn new_parser() -> Parser {
    Parser::new().sentence_only(Sentence::GGA)
}

/// Classify one parser result.
pub fn translate(result: Result<ParseResult, &str>) -> GpsEvent {
    match result {
        Ok(ParseResult::GGA(Some(gga))) => GpsEvent::Update(Some(FixReport {
            location: Location::new(gga.latitude.as_f64(), gga.longitude.as_f64()),
            altitude_m: gga.altitude.meters,
            satellites: gga.sat_in_use,
        })),
        Ok(ParseResult::GGA(None)) => GpsEvent::Update(None),
        Ok(_) => GpsEvent::Unknown,
        Err(e) => {
            debug!("GPS: NMEA parse error: {}", e);
            GpsEvent::Unknown
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF: UART reader thread
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use uart::NmeaReceiver;

#[cfg(target_os = "espidf")]
mod uart {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::JoinHandle;

    use esp_idf_hal::delay::TickType;
    use esp_idf_hal::uart::UartDriver;
    use log::{info, warn};

    use super::{new_parser, translate};
    use crate::app::gps::GpsInput;
    use crate::app::ports::GpsReceiverPort;
    use crate::drivers::worker::{NMEA_READER, spawn_worker};
    use crate::inbox::post_gps;

    const READ_TIMEOUT_MS: u64 = 200;
    const READ_CHUNK: usize = 128;

    pub struct NmeaReceiver {
        uart: Arc<Mutex<UartDriver<'static>>>,
        active: Arc<AtomicBool>,
        reader: Option<JoinHandle<()>>,
    }

    impl NmeaReceiver {
        pub fn new(uart: UartDriver<'static>) -> Self {
            Self {
                uart: Arc::new(Mutex::new(uart)),
                active: Arc::new(AtomicBool::new(false)),
                reader: None,
            }
        }
    }

    fn read_loop(uart: &Mutex<UartDriver<'static>>, active: &AtomicBool) {
        let mut parser = new_parser();
        let mut buf = [0u8; READ_CHUNK];
        let timeout = TickType::new_millis(READ_TIMEOUT_MS).ticks();

        while active.load(Ordering::Acquire) {
            let read = uart
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read(&mut buf, timeout);
            match read {
                Ok(0) => {}
                Ok(n) => {
                    for result in parser.parse_from_bytes(&buf[..n]) {
                        post_gps(GpsInput::Sentence(translate(result)));
                    }
                }
                Err(e) => warn!("GPS: UART read failed: {}", e),
            }
        }
    }

    impl GpsReceiverPort for NmeaReceiver {
        fn subscribe(&mut self) {
            if self.reader.is_some() {
                return;
            }
            if let Err(e) = self.uart.lock().unwrap_or_else(PoisonError::into_inner).clear_rx() {
                warn!("GPS: UART rx flush failed: {}", e);
            }
            self.active.store(true, Ordering::Release);

            let uart = Arc::clone(&self.uart);
            let active = Arc::clone(&self.active);
            match spawn_worker(NMEA_READER, move || read_loop(&uart, &active)) {
                Ok(handle) => {
                    self.reader = Some(handle);
                    info!("GPS: NMEA reader started");
                }
                Err(e) => {
                    self.active.store(false, Ordering::Release);
                    warn!("GPS: NMEA reader spawn failed: {}", e);
                }
            }
        }

        fn unsubscribe(&mut self) {
            self.active.store(false, Ordering::Release);
            if let Some(handle) = self.reader.take() {
                if handle.join().is_err() {
                    warn!("GPS: NMEA reader panicked");
                }
                info!("GPS: NMEA reader stopped");
            }
        }

        fn is_subscribed(&self) -> bool {
            self.reader.is_some()
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host: direct feed
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct NmeaReceiver {
    parser: Option<Parser>,
}

#[cfg(not(target_os = "espidf"))]
impl NmeaReceiver {
    pub fn new() -> Self {
        Self { parser: None }
    }

    /// Parse `bytes` as if they came off the UART.  Returns nothing while
    /// unsubscribed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<GpsEvent> {
        match self.parser.as_mut() {
            Some(parser) => parser.parse_from_bytes(bytes).map(translate).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for NmeaReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl GpsReceiverPort for NmeaReceiver {
    fn subscribe(&mut self) {
        if self.parser.is_none() {
            self.parser = Some(new_parser());
        }
    }

    fn unsubscribe(&mut self) {
        self.parser = None;
    }

    fn is_subscribed(&self) -> bool {
        self.parser.is_some()
    }
}
