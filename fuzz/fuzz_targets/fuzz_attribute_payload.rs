//! Fuzz target: BLE attribute write parsers
//!
//! Invariants checked:
//! - No panics under any payload
//! - An accepted spawn location is always within ±90 / ±180
//! - An accepted colour never exceeds 24 bits
//!
//! cargo fuzz run fuzz_attribute_payload

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcompass::app::attributes;
use mcompass::context::PointerColor;

fuzz_target!(|data: &[u8]| {
    if let Ok(loc) = attributes::parse_spawn(data) {
        assert!(loc.is_valid());
        let text = attributes::format_spawn(&loc);
        assert!(attributes::parse_spawn(text.as_bytes()).is_ok());
    }

    if let Ok(update) = attributes::parse_color(data) {
        if let Some(color) = update.merge(PointerColor::default()) {
            assert!(color.south_color <= PointerColor::RGB_MASK);
            assert!(color.spawn_color <= PointerColor::RGB_MASK);
        }
    }

    let _ = attributes::parse_brightness(data);
    let _ = attributes::parse_server_mode(data);
    let _ = attributes::parse_model(data);
});
