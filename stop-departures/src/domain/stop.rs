//! Physical stop type.

use serde::Serialize;

/// A physical boarding stand and the routes it serves.
///
/// Stops are built once by the registry, which guarantees `route_numbers`
/// is non-empty and `operators` holds no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    pub display_name: String,
    pub operators: Vec<String>,
    pub route_numbers: Vec<String>,
    /// Upstream timetable datasets, in merge order.
    pub dataset_ids: Vec<String>,
}

impl Stop {
    /// Primary operator, used when a route has no operator of its own.
    pub fn primary_operator(&self) -> &str {
        self.operators.first().map(String::as_str).unwrap_or("Unknown")
    }
}
