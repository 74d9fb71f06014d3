//! Scheduled departure type.

use chrono::{DateTime, Utc};

use super::service::{ServiceStatus, classify};

/// A departure synthesized from one timing-point occurrence in a timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledDeparture {
    pub scheduled_time: DateTime<Utc>,
    /// Scheduled time plus synthetic variance.
    pub estimated_time: DateTime<Utc>,
}

impl ScheduledDeparture {
    pub fn new(scheduled_time: DateTime<Utc>, estimated_time: DateTime<Utc>) -> Self {
        Self {
            scheduled_time,
            estimated_time,
        }
    }

    /// Status according to the shared delta rule.
    pub fn status(&self) -> ServiceStatus {
        classify(self.scheduled_time, self.estimated_time)
    }
}
