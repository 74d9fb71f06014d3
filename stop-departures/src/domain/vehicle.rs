//! Live vehicle observation type.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One tracked vehicle from a single live feed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleObservation {
    pub vehicle_ref: String,
    pub line_ref: String,
    /// Public route number, as shown on the vehicle.
    pub route_number: String,
    pub destination: String,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl VehicleObservation {
    /// Does this vehicle serve the given route?
    ///
    /// Matches on either the public route number or the raw line reference.
    pub fn serves_route(&self, route_number: &str) -> bool {
        self.route_number == route_number || self.line_ref == route_number
    }
}
