//! User preference store.
//!
//! Implements [`PreferencePort`] on top of any [`StoragePort`].  Each
//! setting is its own postcard blob under the `mcompass` namespace, so one
//! corrupted key never takes the others down with it.

use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::adapters::nvs::NAMESPACE;
use crate::app::ports::{PreferencePort, StorageError, StoragePort, StoredPreferences};
use crate::context::{Location, Model, PointerColor, ServerMode};

const KEY_SPAWN: &str = "spawn";
const KEY_COLOR: &str = "color";
const KEY_SERVER_MODE: &str = "srv_mode";
const KEY_BRIGHTNESS: &str = "bright";
const KEY_MODEL: &str = "model";

const ALL_KEYS: [&str; 5] = [KEY_SPAWN, KEY_COLOR, KEY_SERVER_MODE, KEY_BRIGHTNESS, KEY_MODEL];

/// Largest encoded setting (a location is two varint-free f64s).
const MAX_VALUE_LEN: usize = 32;

pub struct Preferences<S> {
    storage: S,
}

impl<S: StoragePort> Preferences<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn put<T: Serialize>(&mut self, key: &str, value: &T) {
        let mut buf = [0u8; MAX_VALUE_LEN];
        let encoded = match postcard::to_slice(value, &mut buf) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("NVS: encode {} failed: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.storage.write(NAMESPACE, key, encoded) {
            warn!("NVS: save {} failed: {}", key, e);
        }
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut buf = [0u8; MAX_VALUE_LEN];
        let len = match self.storage.read(NAMESPACE, key, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                warn!("NVS: read {} failed: {}", key, e);
                return None;
            }
        };
        match postcard::from_bytes(&buf[..len]) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("NVS: {} corrupted, ignoring", key);
                None
            }
        }
    }
}

impl<S: StoragePort> PreferencePort for Preferences<S> {
    fn save_spawn_location(&mut self, loc: Location) {
        self.put(KEY_SPAWN, &loc);
    }

    fn save_pointer_color(&mut self, color: PointerColor) {
        self.put(KEY_COLOR, &color);
    }

    fn set_server_mode(&mut self, mode: ServerMode) {
        self.put(KEY_SERVER_MODE, &mode);
    }

    fn set_brightness(&mut self, value: u8) {
        self.put(KEY_BRIGHTNESS, &value);
    }

    fn set_model(&mut self, model: Model) {
        self.put(KEY_MODEL, &model);
    }

    fn load(&self) -> StoredPreferences {
        let spawn_location = self.get::<Location>(KEY_SPAWN).map(|loc| {
            if loc.is_valid() {
                loc
            } else {
                warn!("NVS: stored spawn out of range, treating as unset");
                Location::UNSET
            }
        });
        StoredPreferences {
            spawn_location,
            pointer_color: self
                .get::<PointerColor>(KEY_COLOR)
                .map(|c| PointerColor::new(c.south_color, c.spawn_color)),
            server_mode: self.get(KEY_SERVER_MODE),
            brightness: self.get(KEY_BRIGHTNESS),
            model: self.get(KEY_MODEL),
        }
    }

    fn clear(&mut self) {
        for key in ALL_KEYS {
            if let Err(e) = self.storage.delete(NAMESPACE, key) {
                warn!("NVS: delete {} failed: {}", key, e);
            }
        }
        info!("NVS: preferences cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    fn prefs() -> Preferences<NvsAdapter> {
        Preferences::new(NvsAdapter::new().unwrap())
    }

    #[test]
    fn empty_store_loads_nothing() {
        assert_eq!(prefs().load(), StoredPreferences::default());
    }

    #[test]
    fn settings_survive_reload() {
        let mut p = prefs();
        p.save_spawn_location(Location::new(12.345678, 98.765432));
        p.save_pointer_color(PointerColor::new(0x112233, 0x445566));
        p.set_server_mode(ServerMode::Wifi);
        p.set_brightness(200);
        p.set_model(Model::Gps);

        let reopened = Preferences::new(p.storage().clone());
        let stored = reopened.load();
        assert_eq!(stored.spawn_location, Some(Location::new(12.345678, 98.765432)));
        assert_eq!(stored.pointer_color, Some(PointerColor::new(0x112233, 0x445566)));
        assert_eq!(stored.server_mode, Some(ServerMode::Wifi));
        assert_eq!(stored.brightness, Some(200));
        assert_eq!(stored.model, Some(Model::Gps));
    }

    #[test]
    fn out_of_range_spawn_loads_as_unset() {
        let mut p = prefs();
        p.save_spawn_location(Location::new(95.0, 10.0));
        assert_eq!(p.load().spawn_location, Some(Location::UNSET));
    }

    #[test]
    fn corrupted_key_is_skipped() {
        let mut p = prefs();
        p.set_brightness(50);
        p.storage.write(NAMESPACE, KEY_MODEL, &[9]).unwrap();
        let stored = p.load();
        assert_eq!(stored.brightness, Some(50));
        assert_eq!(stored.model, None);
    }

    #[test]
    fn stored_values_reach_context() {
        use crate::context::Context;
        use crate::events::EventBus;

        let mut p = prefs();
        p.set_brightness(77);
        p.set_model(Model::Gps);
        let ctx = Context::new(Box::leak(Box::new(EventBus::new())));
        p.load().apply_to(&ctx);
        assert_eq!(ctx.brightness(), 77);
        assert!(ctx.is_gps_model());
        assert_eq!(ctx.color(), PointerColor::default());
    }

    #[test]
    fn clear_erases_everything() {
        let mut p = prefs();
        p.set_brightness(1);
        p.save_spawn_location(Location::new(1.0, 2.0));
        p.clear();
        assert_eq!(p.load(), StoredPreferences::default());
    }
}
