//! Data transfer objects for web responses.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Service, Stop};

/// Envelope wrapping every API payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the payload came straight from the cache, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,

    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached: None,
            timestamp: Utc::now(),
        }
    }

    /// Successful response annotated with the cache-hit flag.
    pub fn cached(data: T, cached: bool) -> Self {
        Self {
            cached: Some(cached),
            ..Self::ok(data)
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A registered stop as listed by `/api/stops`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub id: String,
    pub name: String,
    pub operators: Vec<String>,
    pub routes: Vec<String>,
}

impl StopResult {
    pub fn from_stop(stop: &Stop) -> Self {
        Self {
            id: stop.id.clone(),
            name: stop.display_name.clone(),
            operators: stop.operators.clone(),
            routes: stop.route_numbers.clone(),
        }
    }
}

/// Departures for one stop.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopServicesResult {
    pub stop_id: String,
    pub stop_name: String,
    pub services: Vec<Service>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceSource;
    use chrono::TimeZone;

    fn stop() -> Stop {
        Stop {
            id: "quadrant-a".into(),
            display_name: "Quadrant Bus Station (Stand A)".into(),
            operators: vec!["First Cymru".into()],
            route_numbers: vec!["4".into(), "4A".into()],
            dataset_ids: vec!["1234".into()],
        }
    }

    #[test]
    fn envelope_omits_absent_fields() {
        let json = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("error").is_none());
        assert!(json.get("cached").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn envelope_carries_cache_flag() {
        let json = serde_json::to_value(ApiResponse::cached("x", true)).unwrap();
        assert_eq!(json["cached"], true);
    }

    #[test]
    fn error_body_is_unsuccessful() {
        let json = serde_json::to_value(ErrorResponse::new("unknown stop: NOPE")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "unknown stop: NOPE");
    }

    #[test]
    fn stop_result_hides_dataset_ids() {
        let json = serde_json::to_value(StopResult::from_stop(&stop())).unwrap();

        assert_eq!(json["id"], "quadrant-a");
        assert_eq!(json["name"], "Quadrant Bus Station (Stand A)");
        assert_eq!(json["routes"], serde_json::json!(["4", "4A"]));
        assert!(json.get("datasetIds").is_none());
    }

    #[test]
    fn service_serializes_in_camel_case() {
        let t = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let result = StopServicesResult {
            stop_id: "quadrant-a".into(),
            stop_name: "Quadrant".into(),
            services: vec![Service::new("4", "Blaenymaes", "First Cymru", t, t, ServiceSource::Fallback)],
        };

        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json["stopId"], "quadrant-a");
        assert_eq!(json["services"][0]["routeNumber"], "4");
        assert_eq!(json["services"][0]["status"], "onTime");
        assert_eq!(json["services"][0]["source"], "fallback");
    }
}
