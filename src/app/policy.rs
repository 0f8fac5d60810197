//! Distance-to-sleep policy.
//!
//! Maps the great-circle distance between the current fix and the spawn
//! point to a GPS duty cycle.  Far from the target the heading barely
//! changes, so the module can sleep between fixes.
//!
//! Two passes over the ascending [`SLEEP_TABLE`]:
//!
//! 1. **threshold**: largest entry with `threshold <= distance`;
//! 2. **band**: `distance % threshold`, then the smallest entry with
//!    `threshold >= remainder` supplies the result.
//!
//! Distances below the smallest threshold (and non-finite input) return
//! the first entry: stay powered, never sleep.

/// One row of the duty-cycle table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepConfig {
    pub distance_threshold_km: f64,
    pub sleep_interval_secs: u32,
    pub gps_power_enabled: bool,
}

/// Duty-cycle table, ascending by threshold.
pub const SLEEP_TABLE: [SleepConfig; 4] = [
    SleepConfig {
        distance_threshold_km: 10.0,
        sleep_interval_secs: 0,
        gps_power_enabled: true,
    },
    SleepConfig {
        distance_threshold_km: 50.0,
        sleep_interval_secs: 300,
        gps_power_enabled: false,
    },
    SleepConfig {
        distance_threshold_km: 100.0,
        sleep_interval_secs: 600,
        gps_power_enabled: false,
    },
    SleepConfig {
        distance_threshold_km: 200.0,
        sleep_interval_secs: 900,
        gps_power_enabled: false,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepDecision {
    /// Threshold chosen by the first pass.
    pub threshold_km: f64,
    pub sleep_interval_secs: u32,
    pub gps_power_enabled: bool,
}

impl SleepDecision {
    const fn from_entry(threshold_km: f64, entry: &SleepConfig) -> Self {
        Self {
            threshold_km,
            sleep_interval_secs: entry.sleep_interval_secs,
            gps_power_enabled: entry.gps_power_enabled,
        }
    }
}

/// Decide the duty cycle for `distance_km` using [`SLEEP_TABLE`].
pub fn decide(distance_km: f64) -> SleepDecision {
    decide_with(&SLEEP_TABLE, distance_km)
}

/// Decide against an arbitrary ascending, non-empty table.
pub fn decide_with(table: &[SleepConfig], distance_km: f64) -> SleepDecision {
    let Some(first) = table.first() else {
        return SleepDecision {
            threshold_km: 0.0,
            sleep_interval_secs: 0,
            gps_power_enabled: true,
        };
    };

    let selected = table
        .iter()
        .rev()
        .find(|e| distance_km.is_finite() && e.distance_threshold_km <= distance_km)
        .map(|e| e.distance_threshold_km);

    let Some(threshold) = selected.filter(|t| *t > 0.0) else {
        return SleepDecision::from_entry(first.distance_threshold_km, first);
    };

    let remainder = distance_km % threshold;
    let band = table
        .iter()
        .find(|e| e.distance_threshold_km >= remainder)
        .unwrap_or(first);

    SleepDecision::from_entry(threshold, band)
}
