use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use super::timestamp::{naive_ts, seconds_between};

/// Length of one GOPACS Program Time Unit, in hours.
pub const PTU_HOURS: f64 = 0.25;

/// A GOPACS clearing event as published, owning its PTU slices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearingEvent {
    pub id: Option<String>,
    pub organisation_name: Option<String>,
    pub buy_volume_mwh: Option<f64>,
    pub sell_volume_mwh: Option<f64>,
    pub start_time: Option<PrimitiveDateTime>,
    pub end_time: Option<PrimitiveDateTime>,
    pub ptus: Vec<PtuVolume>,
}

/// Cleared volume for a single 15-minute slice of a clearing event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtuVolume {
    pub start_time: Option<PrimitiveDateTime>,
    pub end_time: Option<PrimitiveDateTime>,
    pub buy_volume_mw: Option<f64>,
    pub sell_volume_mw: Option<f64>,
}

/// One persisted row: a PTU slice with its parent event's fields copied in.
///
/// `clearing_event_id` is the only link back to the parent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedBucketPtu {
    pub clearing_event_id: Option<String>,
    pub organisation_name: Option<String>,
    #[serde(rename = "buyVolumeInMWh")]
    pub event_buy_volume_mwh: Option<f64>,
    #[serde(rename = "sellVolumeInMWh")]
    pub event_sell_volume_mwh: Option<f64>,
    #[serde(default, with = "naive_ts")]
    pub event_start_time: Option<PrimitiveDateTime>,
    #[serde(default, with = "naive_ts")]
    pub event_end_time: Option<PrimitiveDateTime>,
    #[serde(default, with = "naive_ts")]
    pub ptu_start_time: Option<PrimitiveDateTime>,
    #[serde(default, with = "naive_ts")]
    pub ptu_end_time: Option<PrimitiveDateTime>,
    #[serde(rename = "buyVolumeInMW")]
    pub buy_volume_mw: Option<f64>,
    #[serde(rename = "sellVolumeInMW")]
    pub sell_volume_mw: Option<f64>,
    pub event_duration_hours: Option<f64>,
    pub ptu_duration_minutes: Option<f64>,
    #[serde(rename = "energyMWh")]
    pub energy_mwh: Option<f64>,
}

impl ClearedBucketPtu {
    pub const COLUMNS: &'static [&'static str] = &[
        "clearingEventId",
        "organisationName",
        "buyVolumeInMWh",
        "sellVolumeInMWh",
        "eventStartTime",
        "eventEndTime",
        "ptuStartTime",
        "ptuEndTime",
        "buyVolumeInMW",
        "sellVolumeInMW",
        "eventDurationHours",
        "ptuDurationMinutes",
        "energyMWh",
    ];

    /// Recompute durations and energy from the row's own timestamps and volumes.
    pub fn derive_metrics(&mut self) {
        self.event_duration_hours =
            seconds_between(self.event_start_time, self.event_end_time).map(|s| s / 3600.0);
        self.ptu_duration_minutes =
            seconds_between(self.ptu_start_time, self.ptu_end_time).map(|s| s / 60.0);
        self.energy_mwh = self.buy_volume_mw.map(|mw| mw * PTU_HOURS);
    }
}
