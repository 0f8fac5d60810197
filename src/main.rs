//! MCompass Firmware: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  GpioPowerRail   NmeaReceiver   OneShot      GattServer        │
//! │  (GpsPower)      (GpsReceiver)  (Timer)      (Gatt)            │
//! │  NvsAdapter      Preferences    PixelDriver  SystemClock       │
//! │  (Config)        (Preference)   (Pixel)      (Clock)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌──────────────────────┐    ┌──────────────────────────┐      │
//! │  │ GpsController        │    │ BleConfigService         │      │
//! │  │ policy · geo         │    │ attributes · device info │      │
//! │  └──────────────────────┘    └──────────────────────────┘      │
//! │                                                                │
//! │  Context (atomics) · EventBus · worker inboxes                 │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot wires the adapters, restores user preferences into the shared
//! context and then hands each controller to its own worker thread.  After
//! that `main` only waits; all work happens in the inbox loops.
#![deny(unused_must_use)]

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::timer::EspTaskTimerService;
use futures_lite::future::block_on;
use log::{error, info, warn};

use mcompass::adapters::ble::GattServer;
use mcompass::adapters::nmea::NmeaReceiver;
use mcompass::adapters::nvs::NvsAdapter;
use mcompass::adapters::preferences::Preferences;
use mcompass::adapters::time::SystemClock;
use mcompass::app::ble_service::{BleConfigService, BlePorts};
use mcompass::app::gps::GpsController;
use mcompass::app::ports::{ConfigPort, PreferencePort};
use mcompass::config::FirmwareConfig;
use mcompass::context::Context;
use mcompass::drivers::gps_power::GpioPowerRail;
use mcompass::drivers::one_shot::OneShot;
use mcompass::drivers::pixel::PixelDriver;
use mcompass::drivers::worker::{BLE_WORKER, GPS_WORKER, SYSTEM_WORKER, spawn_worker};
use mcompass::events::{EventBus, EventKind};
use mcompass::inbox::{self, SYSTEM_INBOX};
use mcompass::pins;
use mcompass::sensors::AzimuthCell;

static BUS: EventBus = EventBus::new();

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  MCompass v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config + preferences from NVS ──────────────────────
    let nvs = NvsAdapter::new()?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS: config load failed ({}), using defaults", e);
            FirmwareConfig::default()
        }
    };

    let prefs = Preferences::new(nvs.clone());
    let ctx = Arc::new(Context::new(&BUS));
    prefs.load().apply_to(&ctx);
    info!(
        "Boot: model={:?} spawn={:?} brightness={}",
        ctx.model(),
        ctx.spawn_location(),
        ctx.brightness()
    );

    let azimuth = Arc::new(AzimuthCell::new());
    let pixel = PixelDriver::new(ctx.brightness());

    // ── 3. Peripherals ────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let timers = EspTaskTimerService::new()?;

    // SAFETY: pin numbers come from the board map and are not claimed
    // by any other driver.
    let gps_en = PinDriver::output(unsafe { AnyOutputPin::new(pins::GPS_EN_GPIO) })?;
    let power = GpioPowerRail::new(gps_en);

    let uart = UartDriver::new(
        peripherals.uart1,
        unsafe { AnyIOPin::new(pins::GPS_TX_GPIO) },
        unsafe { AnyIOPin::new(pins::GPS_RX_GPIO) },
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(config.gps_uart_baud)),
    )?;
    let receiver = NmeaReceiver::new(uart);

    // ── 4. Timers (callbacks only raise their expiry signal) ──
    let detect_timer = OneShot::new(&timers, "gps_detect", || {
        inbox::GPS_DETECT_EXPIRED.signal(());
    })?;
    let sleep_timer = OneShot::new(&timers, "gps_sleep", || {
        inbox::GPS_SLEEP_EXPIRED.signal(());
    })?;
    let shutdown_timer = OneShot::new(&timers, "ble_shutdown", || {
        inbox::BLE_SHUTDOWN_EXPIRED.signal(());
    })?;

    // ── 5. Event fabric consumers ─────────────────────────────
    for kind in [EventKind::FactoryReset, EventKind::SensorCalibrate, EventKind::Subscribe] {
        BUS.subscribe(kind, inbox::deliver_system)?;
    }

    // ── 6. Workers ────────────────────────────────────────────
    let mut gps = GpsController::new(
        power,
        receiver,
        detect_timer,
        sleep_timer,
        Arc::clone(&ctx),
        &config,
    );
    let gps_worker = spawn_worker(GPS_WORKER, move || {
        gps.init();
        loop {
            gps.handle(block_on(inbox::next_gps()));
        }
    })?;

    let ble_ctx = Arc::clone(&ctx);
    let ble_config = config.clone();
    let ble_prefs = Preferences::new(nvs.clone());
    let ble_worker = spawn_worker(BLE_WORKER, move || {
        let gatt = match GattServer::start(&ble_config) {
            Ok(gatt) => gatt,
            Err(e) => {
                error!("BLE: stack init failed: {}", e);
                return;
            }
        };
        let ports = BlePorts {
            gatt,
            prefs: ble_prefs,
            pixel,
            clock: SystemClock::new(),
            shutdown_timer,
        };
        let mut service =
            BleConfigService::new(ports, ble_ctx, azimuth, inbox::deliver_ble, &ble_config);
        service.start();
        loop {
            service.handle(block_on(inbox::next_ble()));
        }
    })?;

    let mut sys_prefs = prefs;
    let system_worker = spawn_worker(SYSTEM_WORKER, move || {
        loop {
            let event = block_on(SYSTEM_INBOX.receive());
            match event.kind {
                EventKind::FactoryReset => {
                    warn!("Factory reset requested by {:?}", event.source);
                    sys_prefs.clear();
                    esp_idf_hal::reset::restart();
                }
                EventKind::SensorCalibrate => {
                    info!("Calibration requested by {:?}", event.source);
                }
                EventKind::Subscribe => {
                    info!("Heading source now {:?}", event.source);
                }
                EventKind::Azimuth => {}
            }
        }
    })?;

    info!("Boot complete, {} bus subscribers", BUS.subscriber_count());

    // ── 7. Park ───────────────────────────────────────────────
    // Workers run until reboot; the BLE worker exits only if its stack failed to start.
    let workers: [(&str, JoinHandle<()>); 3] = [
        ("gps", gps_worker),
        ("ble", ble_worker),
        ("system", system_worker),
    ];
    for (name, handle) in workers {
        if handle.join().is_err() {
            error!("Worker '{}' panicked", name);
        } else {
            warn!("Worker '{}' exited", name);
        }
    }
    Ok(())
}
