//! BLE configuration service: writes, read-back, notifications, shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_lite::future::block_on;

use mcompass::app::attributes::AttributeId;
use mcompass::app::ble_service::{BleConfigService, BleInput, BlePorts, ServiceState};
use mcompass::app::ports::PeerInfo;
use mcompass::config::FirmwareConfig;
use mcompass::context::{Context, Location, Model, PointerColor, ServerMode};
use mcompass::events::{Event, EventKind, EventSource};
use mcompass::inbox::{self, BLE_INBOX, BLE_INBOX_DEPTH};
use mcompass::sensors::AzimuthCell;

use crate::mock_hw::{MockClock, MockGatt, MockPixel, MockPrefs, MockTimer, context};

type Service = BleConfigService<MockGatt, MockPrefs, MockPixel, MockClock, MockTimer>;

const PEER: PeerInfo = PeerInfo {
    conn_id: 1,
    address: [0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03],
};

fn discard(_: Event) -> bool {
    true
}

fn service_with(ctx: Arc<Context>) -> (Service, Arc<AzimuthCell>) {
    let azimuth = Arc::new(AzimuthCell::new());
    let ports = BlePorts {
        gatt: MockGatt::default(),
        prefs: MockPrefs::default(),
        pixel: MockPixel::default(),
        clock: MockClock::default(),
        shutdown_timer: MockTimer::default(),
    };
    let mut svc = BleConfigService::new(
        ports,
        ctx,
        Arc::clone(&azimuth),
        discard,
        &FirmwareConfig::default(),
    );
    svc.start();
    (svc, azimuth)
}

fn started() -> (Service, Arc<Context>) {
    let ctx = context();
    let (svc, _) = service_with(Arc::clone(&ctx));
    (svc, ctx)
}

fn write(svc: &mut Service, attr: AttributeId, data: &[u8]) {
    svc.handle(BleInput::Write {
        attr,
        data: heapless::Vec::from_slice(data).unwrap(),
    });
}

// ── Start-up ──────────────────────────────────────────────────

#[test]
fn start_publishes_initial_values() {
    let (svc, ctx) = started();
    let gatt = &svc.ports().gatt;

    assert_eq!(svc.state(), ServiceState::Running);
    assert_eq!(gatt.text(AttributeId::Color), "ff0000,00ff00");
    assert_eq!(gatt.text(AttributeId::Spawn), "0.000000,0.000000");
    assert_eq!(gatt.value(AttributeId::Azimuth), 0i32.to_le_bytes());
    assert_eq!(gatt.value(AttributeId::Brightness), [16]);
    assert_eq!(gatt.value(AttributeId::ServerMode), [ServerMode::Wifi as u8]);
    assert_eq!(gatt.value(AttributeId::CustomModel), [Model::Lite as u8]);
    let info: serde_json::Value =
        serde_json::from_slice(gatt.value(AttributeId::DeviceInfo)).unwrap();
    assert_eq!(info["gpsStatus"], "0");

    assert_eq!(gatt.advertising_starts, 1);
    assert_eq!(svc.ports().shutdown_timer.armed, Some(Duration::from_secs(60)));
    assert_eq!(ctx.bus().subscriber_count(), 1);
}

// ── Spawn location ────────────────────────────────────────────

#[test]
fn spawn_round_trip() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Spawn, b"12.345678,98.765432");

    assert_eq!(svc.ports().gatt.text(AttributeId::Spawn), "12.345678,98.765432");
    assert_eq!(ctx.spawn_location(), Location::new(12.345678, 98.765432));
    assert_eq!(
        svc.ports().prefs.stored.spawn_location,
        Some(Location::new(12.345678, 98.765432))
    );
}

#[test]
fn repeated_write_is_idempotent() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Spawn, b"-33.5,151.25");
    let once = (ctx.spawn_location(), svc.ports().gatt.text(AttributeId::Spawn).to_owned());
    write(&mut svc, AttributeId::Spawn, b"-33.5,151.25");
    let twice = (ctx.spawn_location(), svc.ports().gatt.text(AttributeId::Spawn).to_owned());
    assert_eq!(once, twice);
}

#[test]
fn boundary_coordinates_accepted() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Spawn, b"90,180");
    assert_eq!(ctx.spawn_location(), Location::new(90.0, 180.0));
    write(&mut svc, AttributeId::Spawn, b"-90,-180");
    assert_eq!(ctx.spawn_location(), Location::new(-90.0, -180.0));
}

#[test]
fn rejected_spawn_leaves_read_back_unchanged() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Spawn, b"1.5,2.5");
    let writes = svc.ports().prefs.writes;

    let rejected: [&[u8]; 5] = [b"90.0001,0", b"0,180.0001", b"12.5", b"abc,def", &[0xFF, 0xFE]];
    for bad in rejected {
        write(&mut svc, AttributeId::Spawn, bad);
        assert_eq!(svc.ports().gatt.text(AttributeId::Spawn), "1.500000,2.500000");
    }
    assert_eq!(ctx.spawn_location(), Location::new(1.5, 2.5));
    assert_eq!(svc.ports().prefs.writes, writes);
}

// ── Pointer colour ────────────────────────────────────────────

#[test]
fn single_colour_token_sets_south_only() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Color, b"1a2b3c");

    let expected = PointerColor::new(0x1a2b3c, 0x00ff00);
    assert_eq!(svc.ports().prefs.stored.pointer_color, Some(expected));
    assert_eq!(ctx.color(), expected);
    assert_eq!(svc.ports().gatt.text(AttributeId::Color), "1a2b3c,00ff00");
}

#[test]
fn two_colour_tokens_set_both() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Color, b"123456,abcdef");
    write(&mut svc, AttributeId::Color, b"ff0000,00ff00");

    let expected = PointerColor::new(0xff0000, 0x00ff00);
    assert_eq!(svc.ports().prefs.stored.pointer_color, Some(expected));
    assert_eq!(ctx.color(), expected);
}

#[test]
fn half_valid_colour_keeps_the_good_field() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Color, b"zz,0000ff");
    assert_eq!(ctx.color(), PointerColor::new(0xff0000, 0x0000ff));

    let writes = svc.ports().prefs.writes;
    write(&mut svc, AttributeId::Color, b"nothex");
    write(&mut svc, AttributeId::Color, b"11,22,33");
    assert_eq!(svc.ports().prefs.writes, writes);
    assert_eq!(svc.ports().gatt.text(AttributeId::Color), "ff0000,0000ff");
}

#[test]
fn empty_south_token_still_sets_spawn_colour() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Color, b",0000ff");

    let expected = PointerColor::new(0xff0000, 0x0000ff);
    assert_eq!(ctx.color(), expected);
    assert_eq!(svc.ports().prefs.stored.pointer_color, Some(expected));
    assert_eq!(svc.ports().gatt.text(AttributeId::Color), "ff0000,0000ff");
}

// ── Single-byte settings ──────────────────────────────────────

#[test]
fn brightness_reaches_pixel_driver() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::Brightness, &[200]);
    assert_eq!(ctx.brightness(), 200);
    assert_eq!(svc.ports().pixel.brightness, Some(200));
    assert_eq!(svc.ports().prefs.stored.brightness, Some(200));
    assert_eq!(svc.ports().gatt.value(AttributeId::Brightness), [200]);

    write(&mut svc, AttributeId::Brightness, &[1, 2]);
    assert_eq!(ctx.brightness(), 200);
}

#[test]
fn server_mode_and_model_writes() {
    let (mut svc, ctx) = started();
    write(&mut svc, AttributeId::ServerMode, &[1]);
    write(&mut svc, AttributeId::CustomModel, &[1]);
    assert_eq!(ctx.server_mode(), ServerMode::Ble);
    assert_eq!(ctx.model(), Model::Gps);

    let info: serde_json::Value =
        serde_json::from_slice(svc.ports().gatt.value(AttributeId::DeviceInfo)).unwrap();
    assert_eq!(info["model"], "1");

    write(&mut svc, AttributeId::ServerMode, &[7]);
    write(&mut svc, AttributeId::CustomModel, &[9]);
    assert_eq!(ctx.server_mode(), ServerMode::Ble);
    assert_eq!(ctx.model(), Model::Gps);
    assert_eq!(svc.ports().gatt.value(AttributeId::CustomModel), [Model::Gps as u8]);
}

// ── Commands ──────────────────────────────────────────────────

static RESETS: AtomicU32 = AtomicU32::new(0);
static CALIBRATIONS: AtomicU32 = AtomicU32::new(0);

fn count_commands(event: Event) -> bool {
    assert_eq!(event.source, EventSource::Ble);
    match event.kind {
        EventKind::FactoryReset => RESETS.fetch_add(1, Ordering::SeqCst),
        EventKind::SensorCalibrate => CALIBRATIONS.fetch_add(1, Ordering::SeqCst),
        _ => 0,
    };
    true
}

#[test]
fn command_attributes_post_to_bus() {
    let ctx = context();
    ctx.bus().subscribe(EventKind::FactoryReset, count_commands).unwrap();
    ctx.bus().subscribe(EventKind::SensorCalibrate, count_commands).unwrap();
    let (mut svc, _) = service_with(Arc::clone(&ctx));

    write(&mut svc, AttributeId::Calibrate, b"1");
    assert_eq!(CALIBRATIONS.load(Ordering::SeqCst), 1);
    assert_eq!(RESETS.load(Ordering::SeqCst), 0);

    write(&mut svc, AttributeId::Reboot, b"");
    assert_eq!(RESETS.load(Ordering::SeqCst), 1);
    assert_eq!(svc.ports().prefs.writes, 0);
}

// ── Connections and notifications ─────────────────────────────

#[test]
fn connect_requests_parameters_and_disconnect_readvertises() {
    let (mut svc, _) = started();
    svc.handle(BleInput::Connected(PEER));
    assert_eq!(svc.connected_count(), 1);
    let (conn_id, params) = svc.ports().gatt.conn_updates[0];
    assert_eq!(conn_id, 1);
    assert_eq!((params.min_interval, params.max_interval), (80, 100));

    svc.handle(BleInput::Disconnected(PEER));
    assert_eq!(svc.connected_count(), 0);
    assert_eq!(svc.ports().gatt.advertising_starts, 2);

    // A stray disconnect never underflows.
    svc.handle(BleInput::Disconnected(PEER));
    assert_eq!(svc.connected_count(), 0);
}

#[test]
fn azimuth_notifications_are_rate_limited() {
    let ctx = context();
    let (mut svc, azimuth) = service_with(Arc::clone(&ctx));
    svc.handle(BleInput::Connected(PEER));

    azimuth.publish(90, &ctx);
    svc.handle(BleInput::Dispatch(Event::azimuth(90)));
    svc.ports_mut().clock.now_ms = 400;
    azimuth.publish(95, &ctx);
    svc.handle(BleInput::Dispatch(Event::azimuth(95)));

    let sent = &svc.ports().gatt.notified;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], (AttributeId::Azimuth, 90i32.to_le_bytes().to_vec()));

    svc.ports_mut().clock.now_ms = 1000;
    svc.handle(BleInput::Dispatch(Event::azimuth(95)));
    assert_eq!(svc.ports().gatt.notified.len(), 2);

    let info: serde_json::Value =
        serde_json::from_slice(svc.ports().gatt.value(AttributeId::DeviceInfo)).unwrap();
    assert_eq!(info["sensorStatus"], "1");
}

#[test]
fn no_notification_without_peer() {
    let (mut svc, _) = started();
    svc.handle(BleInput::Dispatch(Event::azimuth(10)));
    assert!(svc.ports().gatt.notified.is_empty());

    // Non-azimuth events are not notifications either.
    svc.handle(BleInput::Connected(PEER));
    svc.handle(BleInput::Dispatch(Event::new(EventKind::Subscribe, EventSource::Sensor)));
    assert!(svc.ports().gatt.notified.is_empty());
}

// ── Auto-shutdown ─────────────────────────────────────────────

#[test]
fn idle_lite_model_shuts_down() {
    let (mut svc, ctx) = started();
    svc.handle(BleInput::ShutdownTimeout);

    assert_eq!(svc.state(), ServiceState::Shutdown);
    assert!(svc.ports().gatt.shut_down);
    assert_eq!(ctx.bus().subscriber_count(), 0);

    // Everything after shutdown is ignored.
    svc.handle(BleInput::Connected(PEER));
    write(&mut svc, AttributeId::Brightness, &[1]);
    assert_eq!(svc.connected_count(), 0);
    assert_eq!(ctx.brightness(), 16);
}

#[test]
fn connected_peer_keeps_server_up() {
    let (mut svc, _) = started();
    svc.handle(BleInput::Connected(PEER));
    svc.handle(BleInput::ShutdownTimeout);
    assert_eq!(svc.state(), ServiceState::Running);
    assert!(!svc.ports().gatt.shut_down);
}

#[test]
fn gps_model_without_spawn_keeps_server_up() {
    let ctx = context();
    ctx.set_model(Model::Gps);
    let (mut svc, _) = service_with(Arc::clone(&ctx));

    svc.handle(BleInput::ShutdownTimeout);
    assert_eq!(svc.state(), ServiceState::Running);
    assert!(!svc.ports().gatt.shut_down);

    write(&mut svc, AttributeId::Spawn, b"48.8566,2.3522");
    svc.handle(BleInput::ShutdownTimeout);
    assert_eq!(svc.state(), ServiceState::Shutdown);
}

#[test]
fn shutdown_expiry_survives_a_full_inbox() {
    let (mut svc, ctx) = started();
    while BLE_INBOX.try_receive().is_ok() {}
    for _ in 0..BLE_INBOX_DEPTH {
        assert!(inbox::deliver_ble(Event::azimuth(1)));
    }
    assert!(!inbox::deliver_ble(Event::azimuth(2)));

    inbox::BLE_SHUTDOWN_EXPIRED.signal(());
    svc.handle(block_on(inbox::next_ble()));

    assert_eq!(svc.state(), ServiceState::Shutdown);
    assert!(svc.ports().gatt.shut_down);
    assert_eq!(ctx.bus().subscriber_count(), 0);
    while BLE_INBOX.try_receive().is_ok() {}
}
