//! GPS acquisition controller.
//!
//! Owns the GPS power rail, the NMEA receiver subscription and two one-shot
//! timers (detection and sleep).  Every input arrives through the GPS
//! inbox and is handled on the GPS worker thread, so the controller itself
//! needs no locking.
//!
//! ```text
//!  Uninitialized ──init──▶ Detecting ──first sentence──▶ Acquiring ◀──┐
//!                              │                           │  ▲       │
//!                        detect timeout               fix, │  │ sleep │
//!                              │                     sleep │  │ expiry│
//!                              ▼                           ▼  │       │
//!                          Disabled ◀──────disable────── Sleeping ────┘
//! ```
//!
//! Timer expiries reach the worker through their own signals and may
//! arrive late;
//! each handler re-checks the live state before acting.

use std::sync::Arc;

use core::time::Duration;
use log::{debug, info, warn};

use crate::app::geo;
use crate::app::policy::{self, SleepDecision};
use crate::app::ports::{GpsPowerPort, GpsReceiverPort, OneShotTimer};
use crate::config::FirmwareConfig;
use crate::context::{Context, Location};
use crate::events::{Event, EventKind, EventSource};

// ── Inputs ────────────────────────────────────────────────────

/// Position carried by a sentence with a valid fix indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixReport {
    pub location: Location,
    pub altitude_m: f32,
    pub satellites: u8,
}

/// Classified NMEA sentence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpsEvent {
    /// Position sentence; `None` when the receiver reports no fix.
    Update(Option<FixReport>),
    /// Malformed or unsupported sentence.
    Unknown,
}

/// Messages accepted by the GPS worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpsInput {
    Sentence(GpsEvent),
    DetectionTimeout,
    SleepExpired,
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsState {
    Uninitialized,
    Detecting,
    Acquiring,
    Sleeping,
    Disabled,
}

// ── Controller ────────────────────────────────────────────────

pub struct GpsController<P, R, T> {
    power: P,
    receiver: R,
    detect_timer: T,
    sleep_timer: T,
    ctx: Arc<Context>,
    state: GpsState,
    detect_timeout: Duration,
    log_every: u32,
    update_count: u32,
    diagnostics: u32,
    last_decision: Option<SleepDecision>,
}

impl<P, R, T> GpsController<P, R, T>
where
    P: GpsPowerPort,
    R: GpsReceiverPort,
    T: OneShotTimer,
{
    pub fn new(
        power: P,
        receiver: R,
        detect_timer: T,
        sleep_timer: T,
        ctx: Arc<Context>,
        config: &FirmwareConfig,
    ) -> Self {
        Self {
            power,
            receiver,
            detect_timer,
            sleep_timer,
            ctx,
            state: GpsState::Uninitialized,
            detect_timeout: Duration::from_secs(u64::from(config.gps_detect_timeout_secs)),
            log_every: config.gps_log_every.max(1),
            update_count: 0,
            diagnostics: 0,
            last_decision: None,
        }
    }

    pub fn state(&self) -> GpsState {
        self.state
    }

    /// Most recent policy decision, if any fix has been processed.
    pub fn last_decision(&self) -> Option<SleepDecision> {
        self.last_decision
    }

    /// Periodic position/no-fix diagnostic lines emitted so far.
    pub fn diagnostics_count(&self) -> u32 {
        self.diagnostics
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn detect_timer(&self) -> &T {
        &self.detect_timer
    }

    pub fn sleep_timer(&self) -> &T {
        &self.sleep_timer
    }

    /// Power the module and start listening.  Also leaves `Disabled`.
    pub fn init(&mut self) {
        if !matches!(self.state, GpsState::Uninitialized | GpsState::Disabled) {
            warn!("GPS: init ignored in {:?}", self.state);
            return;
        }
        self.power.power_on();
        self.receiver.subscribe();
        self.detect_timer.arm(self.detect_timeout);
        self.update_count = 0;
        self.state = GpsState::Detecting;
        info!(
            "GPS: powered, waiting {}s for first sentence",
            self.detect_timeout.as_secs()
        );
    }

    pub fn handle(&mut self, input: GpsInput) {
        match input {
            GpsInput::Sentence(event) => self.on_event(event),
            GpsInput::DetectionTimeout => self.on_detection_timeout(),
            GpsInput::SleepExpired => self.on_sleep_expired(),
            GpsInput::Disable => self.disable(),
        }
    }

    pub fn on_event(&mut self, event: GpsEvent) {
        if matches!(self.state, GpsState::Uninitialized | GpsState::Disabled) {
            return;
        }
        let GpsEvent::Update(report) = event else {
            return;
        };

        self.update_count = self.update_count.wrapping_add(1);
        self.ctx.set_gps_detected(true);

        if self.state == GpsState::Detecting {
            self.detect_timer.cancel();
            self.state = GpsState::Acquiring;
            info!("GPS: module detected");
        }

        let periodic = self.update_count % self.log_every == 0;
        match report {
            Some(fix) if fix.location.is_valid() => {
                if periodic {
                    self.diagnostics += 1;
                    info!(
                        "GPS: fix lat={:.6} lon={:.6} alt={:.1}m sats={}",
                        fix.location.latitude,
                        fix.location.longitude,
                        fix.altitude_m,
                        fix.satellites
                    );
                }
                self.on_fix(fix.location);
            }
            Some(fix) => {
                warn!(
                    "GPS: discarding out-of-range fix ({}, {})",
                    fix.location.latitude, fix.location.longitude
                );
            }
            None => {
                if periodic {
                    self.diagnostics += 1;
                    debug!("GPS: no fix yet ({} updates)", self.update_count);
                }
            }
        }
    }

    fn on_fix(&mut self, location: Location) {
        self.ctx.set_location(location);
        self.ctx.set_gps_fixed(true);
        self.ctx.set_subscribe_source(EventSource::Sensor);
        self.ctx
            .bus()
            .post(Event::new(EventKind::Subscribe, EventSource::Sensor));

        let distance = geo::distance_km(&location, &self.ctx.spawn_location());
        let decision = policy::decide(distance);
        self.last_decision = Some(decision);

        if decision.gps_power_enabled {
            self.power.power_on();
            self.sleep_timer.cancel();
            self.state = GpsState::Acquiring;
        } else {
            self.power.power_off();
            self.sleep_timer
                .arm(Duration::from_secs(u64::from(decision.sleep_interval_secs)));
            if self.state != GpsState::Sleeping {
                info!(
                    "GPS: {:.1} km to target, sleeping {}s",
                    distance, decision.sleep_interval_secs
                );
            }
            self.state = GpsState::Sleeping;
        }
    }

    pub fn on_detection_timeout(&mut self) {
        if self.state != GpsState::Detecting || self.ctx.gps_detected() {
            return;
        }
        info!("GPS: no module detected, powering down");
        self.disable();
    }

    pub fn on_sleep_expired(&mut self) {
        if self.state != GpsState::Sleeping {
            return;
        }
        self.power.power_on();
        self.state = GpsState::Acquiring;
        info!("GPS: waking for next fix");
    }

    /// Stop listening and cut power.  No-op unless running.
    pub fn disable(&mut self) {
        if !matches!(
            self.state,
            GpsState::Detecting | GpsState::Acquiring | GpsState::Sleeping
        ) {
            return;
        }
        self.receiver.unsubscribe();
        self.detect_timer.cancel();
        self.sleep_timer.cancel();
        self.power.power_off();
        self.state = GpsState::Disabled;
        info!("GPS: disabled");
    }
}
