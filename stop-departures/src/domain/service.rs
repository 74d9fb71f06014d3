//! Departure service types.
//!
//! A `Service` is the unit returned to callers: one upcoming departure of one
//! route from one stop. Its `status` is always derived from the recorded time
//! delta (see [`classify`]), except for vehicle-tracked services which are
//! `Live` unconditionally.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Deviations below this many minutes (in either direction) count as on time.
const ON_TIME_WINDOW_MINS: f64 = 2.0;

/// Services running more than this many minutes late are delayed.
const DELAYED_AFTER_MINS: f64 = 5.0;

/// Services running more than this many minutes early are early.
const EARLY_BEFORE_MINS: f64 = -3.0;

/// Punctuality status of a departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    OnTime,
    Delayed,
    Early,
    /// Deviation too large for on time, too small for delayed/early.
    Estimated,
    /// Time derived from a tracked vehicle.
    Live,
}

/// Where a departure's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSource {
    Timetable,
    VehicleTracking,
    Fallback,
}

/// Classify a departure by its deviation from the scheduled time.
///
/// `|delta| < 2` is on time, `delta > 5` delayed, `delta < -3` early, and
/// everything in between is `Estimated`. Delta is in (fractional) minutes.
pub fn classify(scheduled: DateTime<Utc>, estimated: DateTime<Utc>) -> ServiceStatus {
    let delta_mins = (estimated - scheduled).num_seconds() as f64 / 60.0;

    if delta_mins.abs() < ON_TIME_WINDOW_MINS {
        ServiceStatus::OnTime
    } else if delta_mins > DELAYED_AFTER_MINS {
        ServiceStatus::Delayed
    } else if delta_mins < EARLY_BEFORE_MINS {
        ServiceStatus::Early
    } else {
        ServiceStatus::Estimated
    }
}

/// One upcoming departure from a stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub route_number: String,
    pub destination: String,
    pub operator: String,
    pub scheduled_time: DateTime<Utc>,
    pub estimated_time: Option<DateTime<Utc>>,
    pub status: ServiceStatus,
    pub source: ServiceSource,
}

impl Service {
    /// Build a service from a scheduled/estimated pair, classifying its status.
    pub fn new(
        route_number: impl Into<String>,
        destination: impl Into<String>,
        operator: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        estimated_time: DateTime<Utc>,
        source: ServiceSource,
    ) -> Self {
        Self {
            route_number: route_number.into(),
            destination: destination.into(),
            operator: operator.into(),
            scheduled_time,
            estimated_time: Some(estimated_time),
            status: classify(scheduled_time, estimated_time),
            source,
        }
    }

    /// Returns the best available time (estimated if known, else scheduled).
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.estimated_time.unwrap_or(self.scheduled_time)
    }

    /// Returns true if this service's time comes from a tracked vehicle.
    pub fn is_live(&self) -> bool {
        self.source == ServiceSource::VehicleTracking
    }

    /// Overwrite the estimate with a vehicle-tracked arrival time.
    ///
    /// Only timetable and fallback services are enhanced; returns false (and
    /// leaves the service untouched) if it is already vehicle-tracked.
    pub fn apply_live_estimate(&mut self, estimated: DateTime<Utc>) -> bool {
        if self.is_live() {
            return false;
        }
        self.estimated_time = Some(estimated);
        self.status = ServiceStatus::Live;
        self.source = ServiceSource::VehicleTracking;
        true
    }
}

/// Sort services by effective time and keep at most `limit`.
///
/// The sort is stable, so equal times keep their emission order.
pub fn rank(services: &mut Vec<Service>, limit: usize) {
    services.sort_by_key(Service::effective_time);
    services.truncate(limit);
}
