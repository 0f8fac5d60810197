//! Fuzz target: preference restore from corrupted flash
//!
//! Writes arbitrary blobs under every preference key and loads them back.
//!
//! Invariants checked:
//! - No panics under arbitrary stored bytes
//! - A restored spawn location is always in range
//! - Restored colours are masked to 24 bits
//!
//! cargo fuzz run fuzz_preferences

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcompass::adapters::nvs::NvsAdapter;
use mcompass::adapters::preferences::Preferences;
use mcompass::app::ports::{PreferencePort, StoragePort};
use mcompass::context::PointerColor;

const KEYS: [&str; 5] = ["spawn", "color", "srv_mode", "bright", "model"];

fuzz_target!(|data: &[u8]| {
    let Ok(mut store) = NvsAdapter::new() else {
        return;
    };
    // One length byte per key, then that many bytes of blob.
    let mut rest = data;
    for key in KEYS {
        let Some((&len, tail)) = rest.split_first() else {
            break;
        };
        let len = usize::from(len).min(tail.len()).min(32);
        let (blob, tail) = tail.split_at(len);
        let _ = store.write("mcompass", key, blob);
        rest = tail;
    }

    let stored = Preferences::new(store).load();
    if let Some(loc) = stored.spawn_location {
        assert!(loc.is_valid());
    }
    if let Some(color) = stored.pointer_color {
        assert!(color.south_color <= PointerColor::RGB_MASK);
        assert!(color.spawn_color <= PointerColor::RGB_MASK);
    }
});
