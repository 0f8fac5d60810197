//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the preference store and [`ConfigPort`]
//! for the firmware configuration blob.
//!
//! - **`target_os = "espidf"`**: ESP-IDF `nvs_*` calls on the default
//!   partition.  Every write is followed by `nvs_commit`.
//! - **`not(target_os = "espidf")`**: a shared in-memory map, so clones of
//!   the adapter see the same data (host tests, simulation).
//!
//! Namespaces and keys are truncated to 15 bytes, the NVS limit.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::FirmwareConfig;
use crate::error::{Error, StorageFault};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;
#[cfg(not(target_os = "espidf"))]
use std::sync::{Arc, Mutex};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// `ESP_*` codes are generated as `u32`; `esp_err_t` is `i32`.
#[cfg(target_os = "espidf")]
const OK: esp_err_t = ESP_OK as esp_err_t;
#[cfg(target_os = "espidf")]
const NOT_FOUND: esp_err_t = ESP_ERR_NVS_NOT_FOUND as esp_err_t;

pub const NAMESPACE: &str = "mcompass";
const CONFIG_KEY: &str = "fwcfg";

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 512;

const VALID_BAUD: [u32; 5] = [4800, 9600, 19200, 38400, 115_200];

#[derive(Clone)]
pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

/// NUL-terminated copy of a namespace or key, truncated to 15 bytes.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn c_name(name: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

impl NvsAdapter {
    /// Initialise NVS flash.  A full or version-mismatched partition is
    /// erased and initialised again.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the boot path before any other NVS user.
            let mut ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                warn!("NVS: erasing and re-initialising flash partition");
                let erased = unsafe { nvs_flash_erase() };
                if erased != OK {
                    return Err(StorageFault::FlashInit(erased).into());
                }
                ret = unsafe { nvs_flash_init() };
            }
            if ret != OK {
                return Err(StorageFault::FlashInit(ret).into());
            }
            info!("NVS: flash initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    #[cfg(not(target_os = "espidf"))]
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open `namespace`, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, esp_err_t>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    {
        let ns = c_name(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    /// Read a whole blob, sized by a first length-only query.
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.map()
                .get(&Self::composite_key(namespace, key))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size: usize = 0;
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr().cast(), core::ptr::null_mut(), &mut size)
                };
                if ret != OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH as esp_err_t);
                }
                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != OK {
                    return Err(ret);
                }
                buf.truncate(size);
                Ok(buf)
            });
            match result {
                Ok(buf) => Ok(buf),
                Err(NOT_FOUND) => Err(StorageError::NotFound),
                Err(e) => {
                    warn!("NVS: read {}::{} failed ({})", namespace, key, e);
                    Err(StorageError::IoError)
                }
            }
        }
    }
}

fn validate_config(cfg: &FirmwareConfig) -> Result<(), ConfigError> {
    if cfg.device_name.is_empty() {
        return Err(ConfigError::ValidationFailed("device_name must not be empty"));
    }
    if !(23..=517).contains(&cfg.ble_mtu) {
        return Err(ConfigError::ValidationFailed("ble_mtu must be 23–517"));
    }
    if !(10..=3600).contains(&cfg.ble_server_timeout_secs) {
        return Err(ConfigError::ValidationFailed(
            "ble_server_timeout_secs must be 10–3600",
        ));
    }
    if !(100..=10_000).contains(&cfg.notify_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "notify_interval_ms must be 100–10000",
        ));
    }
    let cp = &cfg.conn_params;
    if cp.min_interval > cp.max_interval {
        return Err(ConfigError::ValidationFailed(
            "conn_params.min_interval must be <= max_interval",
        ));
    }
    if !(5..=600).contains(&cfg.gps_detect_timeout_secs) {
        return Err(ConfigError::ValidationFailed(
            "gps_detect_timeout_secs must be 5–600",
        ));
    }
    if !VALID_BAUD.contains(&cfg.gps_uart_baud) {
        return Err(ConfigError::ValidationFailed("gps_uart_baud not supported"));
    }
    if cfg.gps_log_every == 0 {
        return Err(ConfigError::ValidationFailed("gps_log_every must be >= 1"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<FirmwareConfig, ConfigError> {
        match self.read_blob(NAMESPACE, CONFIG_KEY) {
            Ok(bytes) => {
                let cfg: FirmwareConfig =
                    postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("NVS: loaded config ({} bytes)", bytes.len());
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NVS: no stored config, using defaults");
                Ok(FirmwareConfig::default())
            }
            Err(StorageError::IoError) => {
                warn!("NVS: config read failed, using defaults");
                Ok(FirmwareConfig::default())
            }
        }
    }

    fn save(&self, config: &FirmwareConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        // `StoragePort::write` needs `&mut`; the handle-scoped backend does not.
        self.clone()
            .write(NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("NVS: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.read_blob(namespace, key)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.map()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            Self::with_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(handle, k.as_ptr().cast(), data.as_ptr().cast(), data.len())
                };
                if ret != OK {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    OK => Ok(()),
                    e => Err(e),
                }
            })
            .map_err(|e| {
                warn!("NVS: write {}::{} failed ({})", namespace, key, e);
                StorageError::IoError
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.map().remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            Self::with_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr().cast()) };
                if ret != OK && ret != NOT_FOUND {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    OK => Ok(()),
                    e => Err(e),
                }
            })
            .map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.map()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            Self::with_handle(namespace, false, |handle| {
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr().cast(), core::ptr::null_mut()) };
                Ok(ret == OK)
            })
            .unwrap_or(false)
        }
    }
}
