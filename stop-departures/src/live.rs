//! SIRI-VM live vehicle feed parsing.
//!
//! Live data is always optional, so this parser never fails: a malformed
//! document yields no observations and missing fields take placeholder
//! values.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use tracing::debug;

use crate::domain::VehicleObservation;
use crate::schedule::{DocumentError, child_text, document_text};

/// Placeholder for missing vehicle and line references.
const UNKNOWN_REF: &str = "unknown";

/// Placeholder for a missing destination.
const UNKNOWN_DESTINATION: &str = "Unknown";

fn parse_coordinate(location: Option<Node>, name: &str) -> f64 {
    location
        .and_then(|loc| child_text(loc, name))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

fn parse_timestamp(value: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Convert one `VehicleActivity` element.
///
/// An activity without a `MonitoredVehicleJourney` still yields an
/// observation, with every journey field at its placeholder.
fn parse_activity(activity: Node, now: DateTime<Utc>) -> VehicleObservation {
    let journey = activity
        .children()
        .find(|n| n.has_tag_name("MonitoredVehicleJourney"));
    let field = |name: &str| journey.and_then(|j| child_text(j, name));

    let line_ref = field("LineRef").unwrap_or(UNKNOWN_REF);
    let route_number = field("PublishedLineName").unwrap_or(line_ref);
    let location = journey.and_then(|j| j.children().find(|n| n.has_tag_name("VehicleLocation")));

    VehicleObservation {
        vehicle_ref: field("VehicleRef").unwrap_or(UNKNOWN_REF).to_string(),
        line_ref: line_ref.to_string(),
        route_number: route_number.to_string(),
        destination: field("DestinationName")
            .unwrap_or(UNKNOWN_DESTINATION)
            .to_string(),
        latitude: parse_coordinate(location, "Latitude"),
        longitude: parse_coordinate(location, "Longitude"),
        observed_at: parse_timestamp(child_text(activity, "RecordedAtTime"), now),
    }
}

/// Parse a SIRI-VM document, failing if the delivery structure is absent.
pub fn try_parse_vehicles(
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<Vec<VehicleObservation>, DocumentError> {
    let doc = Document::parse(document_text(bytes)?)?;
    let root = doc.root_element();
    if !root.has_tag_name("Siri") {
        return Err(DocumentError::MissingElement("Siri"));
    }

    let delivery = root
        .children()
        .find(|n| n.has_tag_name("ServiceDelivery"))
        .ok_or(DocumentError::MissingElement("ServiceDelivery"))?;

    let observations = delivery
        .children()
        .filter(|n| n.has_tag_name("VehicleMonitoringDelivery"))
        .flat_map(|vmd| vmd.children().filter(|n| n.has_tag_name("VehicleActivity")))
        .map(|activity| parse_activity(activity, now))
        .collect();

    Ok(observations)
}

/// Parse a SIRI-VM document, degrading to no observations on error.
pub fn parse_vehicles(bytes: &[u8], now: DateTime<Utc>) -> Vec<VehicleObservation> {
    try_parse_vehicles(bytes, now).unwrap_or_else(|e| {
        debug!(error = %e, "Live feed document unusable, treating as empty");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SIRI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Siri xmlns="http://www.siri.org.uk/siri" version="2.0">
  <ServiceDelivery>
    <ResponseTimestamp>2024-03-15T10:00:05+00:00</ResponseTimestamp>
    <VehicleMonitoringDelivery>
      <VehicleActivity>
        <RecordedAtTime>2024-03-15T09:59:30+00:00</RecordedAtTime>
        <MonitoredVehicleJourney>
          <LineRef>FCYM:4</LineRef>
          <PublishedLineName>4</PublishedLineName>
          <DestinationName>Blaenymaes</DestinationName>
          <VehicleLocation>
            <Longitude>-3.9436</Longitude>
            <Latitude>51.6192</Latitude>
          </VehicleLocation>
          <VehicleRef>47512</VehicleRef>
        </MonitoredVehicleJourney>
      </VehicleActivity>
      <VehicleActivity>
        <MonitoredVehicleJourney>
          <LineRef>10</LineRef>
        </MonitoredVehicleJourney>
      </VehicleActivity>
      <VehicleActivity>
        <MonitoredVehicleJourney/>
      </VehicleActivity>
      <VehicleActivity>
        <RecordedAtTime>not a time</RecordedAtTime>
      </VehicleActivity>
    </VehicleMonitoringDelivery>
  </ServiceDelivery>
</Siri>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn parses_complete_activity() {
        let vehicles = parse_vehicles(SIRI.as_bytes(), now());
        let v = &vehicles[0];

        assert_eq!(v.vehicle_ref, "47512");
        assert_eq!(v.line_ref, "FCYM:4");
        assert_eq!(v.route_number, "4");
        assert_eq!(v.destination, "Blaenymaes");
        assert!((v.latitude - 51.6192).abs() < 1e-9);
        assert!((v.longitude + 3.9436).abs() < 1e-9);
        assert_eq!(
            v.observed_at,
            Utc.with_ymd_and_hms(2024, 3, 15, 9, 59, 30).unwrap()
        );
    }

    #[test]
    fn missing_fields_degrade() {
        let vehicles = parse_vehicles(SIRI.as_bytes(), now());
        assert_eq!(vehicles.len(), 4);

        let partial = &vehicles[1];
        assert_eq!(partial.vehicle_ref, "unknown");
        assert_eq!(partial.line_ref, "10");
        assert_eq!(partial.route_number, "10");
        assert_eq!(partial.destination, "Unknown");
        assert_eq!(partial.latitude, 0.0);
        assert_eq!(partial.longitude, 0.0);
        assert_eq!(partial.observed_at, now());

        let empty = &vehicles[2];
        assert_eq!(empty.line_ref, "unknown");
        assert_eq!(empty.route_number, "unknown");
    }

    #[test]
    fn activity_without_journey_is_a_placeholder() {
        let vehicles = parse_vehicles(SIRI.as_bytes(), now());
        let bare = &vehicles[3];

        assert_eq!(bare.vehicle_ref, "unknown");
        assert_eq!(bare.line_ref, "unknown");
        assert_eq!(bare.route_number, "unknown");
        assert_eq!(bare.destination, "Unknown");
        assert_eq!(bare.latitude, 0.0);
        assert_eq!(bare.longitude, 0.0);
        // Unparseable timestamp falls back to the parse time.
        assert_eq!(bare.observed_at, now());
    }

    #[test]
    fn malformed_documents_are_empty() {
        assert!(parse_vehicles(b"<Siri><ServiceDelivery>", now()).is_empty());
        assert!(parse_vehicles(b"<Other/>", now()).is_empty());
        assert!(parse_vehicles(b"<Siri/>", now()).is_empty());
        assert!(parse_vehicles(b"", now()).is_empty());
    }

    #[test]
    fn absent_root_structure_is_reported() {
        let err = try_parse_vehicles(b"<Siri/>", now()).unwrap_err();
        assert!(matches!(err, DocumentError::MissingElement("ServiceDelivery")));
    }

    #[test]
    fn delivery_without_vehicles_is_empty() {
        let doc = "<Siri><ServiceDelivery><VehicleMonitoringDelivery/></ServiceDelivery></Siri>";
        assert!(try_parse_vehicles(doc.as_bytes(), now()).unwrap().is_empty());
    }
}
