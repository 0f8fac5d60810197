//! GPS controller scenarios: detection, duty cycling and power-down.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use mcompass::adapters::nmea::NmeaReceiver;
use mcompass::app::geo;
use mcompass::app::gps::{FixReport, GpsController, GpsEvent, GpsInput, GpsState};
use mcompass::app::policy;
use mcompass::app::ports::{GpsReceiverPort, OneShotTimer};
use mcompass::config::FirmwareConfig;
use mcompass::context::Location;
use mcompass::events::{Event, EventKind, EventSource};

use crate::mock_hw::{MockRail, MockReceiver, MockTimer, context};

type Controller = GpsController<MockRail, MockReceiver, MockTimer>;

/// Kilometres per degree of latitude on the 6371 km sphere.
const KM_PER_DEG: f64 = 111.194_926_6;

const SPAWN: Location = Location::new(10.0, 20.0);

fn controller_with_spawn(spawn: Location) -> Controller {
    let ctx = context();
    ctx.set_spawn_location(spawn);
    GpsController::new(
        MockRail::default(),
        MockReceiver::default(),
        MockTimer::default(),
        MockTimer::default(),
        ctx,
        &FirmwareConfig::default(),
    )
}

/// Fix `km` due north of the spawn point.
fn fix_north_of_spawn(km: f64) -> GpsInput {
    GpsInput::Sentence(GpsEvent::Update(Some(FixReport {
        location: Location::new(SPAWN.latitude + km / KM_PER_DEG, SPAWN.longitude),
        altitude_m: 12.0,
        satellites: 7,
    })))
}

fn no_fix() -> GpsInput {
    GpsInput::Sentence(GpsEvent::Update(None))
}

#[test]
fn boot_to_first_sentence() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    assert_eq!(gps.state(), GpsState::Detecting);
    assert!(gps.power().powered);
    assert_eq!(gps.detect_timer().armed, Some(Duration::from_secs(30)));

    gps.handle(no_fix());
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert!(!gps.detect_timer().is_armed());

    // Late detection alarm after the module answered.
    gps.handle(GpsInput::DetectionTimeout);
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert!(gps.receiver().subscribed);
}

#[test]
fn silent_module_is_powered_down() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(GpsInput::Sentence(GpsEvent::Unknown));
    assert_eq!(gps.state(), GpsState::Detecting);

    gps.handle(GpsInput::DetectionTimeout);
    assert_eq!(gps.state(), GpsState::Disabled);
    assert!(!gps.power().powered);
    assert_eq!(gps.receiver().unsubscribe_calls, 1);
    assert!(!gps.detect_timer().is_armed());
    assert!(!gps.sleep_timer().is_armed());

    // Inputs after power-down are dropped.
    gps.handle(fix_north_of_spawn(5.0));
    assert_eq!(gps.state(), GpsState::Disabled);
    assert_eq!(gps.power().history.last(), Some(&false));
}

#[test]
fn near_target_stays_powered() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(fix_north_of_spawn(5.0));

    let decision = gps.last_decision().unwrap();
    assert_eq!(decision.threshold_km, 10.0);
    assert_eq!(decision.sleep_interval_secs, 0);
    assert!(decision.gps_power_enabled);
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert!(gps.power().powered);
    assert!(!gps.sleep_timer().is_armed());
}

#[test]
fn far_target_sleeps_then_wakes() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(fix_north_of_spawn(120.0));

    let decision = gps.last_decision().unwrap();
    assert_eq!(decision.threshold_km, 100.0);
    assert_eq!(decision.sleep_interval_secs, 300);
    assert_eq!(gps.state(), GpsState::Sleeping);
    assert!(!gps.power().powered);
    assert_eq!(gps.sleep_timer().armed, Some(Duration::from_secs(300)));

    gps.handle(GpsInput::SleepExpired);
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert!(gps.power().powered);

    // Coming closer cancels any pending sleep.
    gps.handle(fix_north_of_spawn(3.0));
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert!(!gps.sleep_timer().is_armed());
}

#[test]
fn stale_sleep_expiry_is_ignored() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(fix_north_of_spawn(1.0));
    let ons = gps.power().history.iter().filter(|on| **on).count();

    gps.handle(GpsInput::SleepExpired);
    assert_eq!(gps.state(), GpsState::Acquiring);
    assert_eq!(gps.power().history.iter().filter(|on| **on).count(), ons);
}

#[test]
fn no_fix_while_sleeping_touches_nothing() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(fix_north_of_spawn(120.0));
    assert_eq!(gps.state(), GpsState::Sleeping);

    let rail_calls = gps.power().history.len();
    let arms = gps.sleep_timer().arm_calls.len();
    let cancels = gps.sleep_timer().cancel_calls;
    for _ in 0..5 {
        gps.handle(no_fix());
    }

    assert_eq!(gps.state(), GpsState::Sleeping);
    assert!(!gps.power().powered);
    assert_eq!(gps.power().history.len(), rail_calls);
    assert_eq!(gps.sleep_timer().arm_calls.len(), arms);
    assert_eq!(gps.sleep_timer().cancel_calls, cancels);
    assert_eq!(gps.sleep_timer().armed, Some(Duration::from_secs(300)));
}

#[test]
fn diagnostics_logged_once_per_ten_updates() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();

    for _ in 0..9 {
        gps.handle(no_fix());
    }
    assert_eq!(gps.diagnostics_count(), 0);

    gps.handle(no_fix());
    assert_eq!(gps.diagnostics_count(), 1);

    for _ in 0..9 {
        gps.handle(fix_north_of_spawn(2.0));
    }
    assert_eq!(gps.diagnostics_count(), 1);
    gps.handle(fix_north_of_spawn(2.0));
    assert_eq!(gps.diagnostics_count(), 2);

    // Unparsed sentences are not position updates.
    gps.handle(GpsInput::Sentence(GpsEvent::Unknown));
    assert_eq!(gps.diagnostics_count(), 2);
}

static SUBSCRIBE_MARKERS: AtomicU32 = AtomicU32::new(0);

fn count_subscribe(event: Event) -> bool {
    if event.kind == EventKind::Subscribe && event.source == EventSource::Sensor {
        SUBSCRIBE_MARKERS.fetch_add(1, Ordering::SeqCst);
    }
    true
}

#[test]
fn valid_fix_announces_sensor_source() {
    let ctx = context();
    ctx.set_spawn_location(SPAWN);
    ctx.bus().subscribe(EventKind::Subscribe, count_subscribe).unwrap();
    let mut gps = GpsController::new(
        MockRail::default(),
        MockReceiver::default(),
        MockTimer::default(),
        MockTimer::default(),
        ctx.clone(),
        &FirmwareConfig::default(),
    );
    gps.init();
    assert!(!ctx.gps_detected());

    gps.handle(no_fix());
    assert!(ctx.gps_detected());
    assert!(!ctx.gps_fixed());
    assert_eq!(SUBSCRIBE_MARKERS.load(Ordering::SeqCst), 0);

    let here = Location::new(10.01, 20.0);
    gps.handle(GpsInput::Sentence(GpsEvent::Update(Some(FixReport {
        location: here,
        altitude_m: 0.0,
        satellites: 5,
    }))));
    assert!(ctx.gps_fixed());
    assert_eq!(ctx.location(), here);
    assert_eq!(ctx.subscribe_source(), EventSource::Sensor);
    assert_eq!(SUBSCRIBE_MARKERS.load(Ordering::SeqCst), 1);

    // A later no-fix sentence keeps the last known position.
    gps.handle(no_fix());
    assert_eq!(ctx.location(), here);
    assert_eq!(gps.state(), GpsState::Acquiring);
}

#[test]
fn disable_then_reinit() {
    let mut gps = controller_with_spawn(SPAWN);
    gps.init();
    gps.handle(fix_north_of_spawn(120.0));
    gps.handle(GpsInput::Disable);
    assert_eq!(gps.state(), GpsState::Disabled);
    assert!(!gps.sleep_timer().is_armed());

    gps.init();
    assert_eq!(gps.state(), GpsState::Detecting);
    assert!(gps.power().powered);
    assert!(gps.receiver().subscribed);
}

#[test]
fn nmea_stream_drives_controller() {
    let mut nmea = NmeaReceiver::new();
    nmea.subscribe();
    let mut gps = controller_with_spawn(Location::UNSET);
    gps.init();

    let stream = b"$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76\r\n";
    let events = nmea.feed(stream);
    assert_eq!(events.len(), 1);
    let GpsEvent::Update(Some(fix)) = events[0] else {
        panic!("expected a fix, got {:?}", events[0]);
    };
    gps.handle(GpsInput::Sentence(events[0]));

    let expected = policy::decide(geo::distance_km(&fix.location, &Location::UNSET));
    assert_eq!(gps.last_decision(), Some(expected));
    let expected_state = if expected.gps_power_enabled {
        GpsState::Acquiring
    } else {
        GpsState::Sleeping
    };
    assert_eq!(gps.state(), expected_state);
}
