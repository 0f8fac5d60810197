//! Fuzz target: NMEA receiver byte stream
//!
//! Feeds arbitrary bytes through the GGA-only parser in arbitrary chunk
//! sizes, the way UART reads would deliver them.
//!
//! Invariants checked:
//! - No panics under any byte sequence or split
//! - Every reported fix carries a finite position
//!
//! cargo fuzz run fuzz_nmea_stream

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcompass::adapters::nmea::NmeaReceiver;
use mcompass::app::gps::GpsEvent;
use mcompass::app::ports::GpsReceiverPort;

fuzz_target!(|data: &[u8]| {
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut rx = NmeaReceiver::new();
    rx.subscribe();
    for piece in stream.chunks(chunk) {
        for event in rx.feed(piece) {
            if let GpsEvent::Update(Some(fix)) = event {
                assert!(fix.location.latitude.is_finite());
                assert!(fix.location.longitude.is_finite());
            }
        }
    }
});
