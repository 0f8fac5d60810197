//! Worker thread spawning.
//!
//! ESP-IDF implements `std::thread` on pthreads, which are thin wrappers
//! around FreeRTOS tasks.  `esp_pthread_set_cfg()` sets thread-local
//! configuration for the *next* `pthread_create()` from the calling
//! thread, so configure and spawn must not be interleaved with other
//! thread creation on the same thread.
//!
//! The ESP32-C3 has a single core; workers differ only in priority and
//! stack size.

use std::io;
use std::thread::JoinHandle;

/// Scheduling parameters for one worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSpec {
    /// NUL-terminated task name, e.g. `"gps\0"`.
    pub name: &'static str,
    pub priority: u8,
    pub stack_kb: usize,
}

pub const GPS_WORKER: WorkerSpec = WorkerSpec {
    name: "gps\0",
    priority: 5,
    stack_kb: 6,
};

pub const BLE_WORKER: WorkerSpec = WorkerSpec {
    name: "ble\0",
    priority: 6,
    stack_kb: 8,
};

pub const SYSTEM_WORKER: WorkerSpec = WorkerSpec {
    name: "system\0",
    priority: 4,
    stack_kb: 4,
};

pub const NMEA_READER: WorkerSpec = WorkerSpec {
    name: "nmea-rx\0",
    priority: 7,
    stack_kb: 4,
};

impl WorkerSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Spawn a FreeRTOS-backed thread with explicit priority and stack.
#[cfg(target_os = "espidf")]
pub fn spawn_worker(
    spec: WorkerSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    use esp_idf_svc::sys::{esp_create_default_pthread_config, esp_pthread_set_cfg, ESP_OK};

    // SAFETY: the config is copied by `esp_pthread_set_cfg`; `name` is
    // 'static and NUL-terminated.
    let ret = unsafe {
        let mut cfg = esp_create_default_pthread_config();
        cfg.prio = spec.priority as _;
        cfg.stack_size = (spec.stack_kb * 1024) as _;
        cfg.thread_name = spec.name.as_ptr().cast();
        esp_pthread_set_cfg(&cfg)
    };
    if ret != ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed ({ret})")));
    }

    log::info!(
        "Spawning '{}' (pri={}, stack={}KB)",
        spec.display_name(),
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

/// Host fallback: priority is ignored.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_worker(
    spec: WorkerSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}
