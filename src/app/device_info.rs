//! Device-info snapshot served on the Info characteristic.
//!
//! Build metadata comes from `build.rs`; the status flags are read from
//! [`Context`] each time the snapshot is rendered.

use serde::Serialize;

use crate::context::Context;

pub const BUILD_DATE: &str = match option_env!("BUILD_DATE") {
    Some(v) => v,
    None => "unknown",
};
pub const BUILD_TIME: &str = match option_env!("BUILD_TIME") {
    Some(v) => v,
    None => "unknown",
};
pub const GIT_BRANCH: &str = match option_env!("GIT_BRANCH") {
    Some(v) => v,
    None => "unknown",
};
pub const GIT_COMMIT: &str = match option_env!("GIT_COMMIT") {
    Some(v) => v,
    None => "unknown",
};
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Field order is the wire order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub build_date: &'static str,
    pub build_time: &'static str,
    pub build_version: &'static str,
    pub git_branch: &'static str,
    pub gps_status: &'static str,
    pub model: &'static str,
    pub sensor_status: &'static str,
    pub git_commit: &'static str,
}

const fn flag(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

impl DeviceInfo {
    pub fn snapshot(ctx: &Context) -> Self {
        Self {
            build_date: BUILD_DATE,
            build_time: BUILD_TIME,
            build_version: BUILD_VERSION,
            git_branch: GIT_BRANCH,
            gps_status: flag(ctx.gps_detected()),
            model: flag(ctx.is_gps_model()),
            sensor_status: flag(ctx.has_sensor()),
            git_commit: GIT_COMMIT,
        }
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Serialising plain string fields cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
