//! TransXChange timetable parsing.
//!
//! A timetable document holds services; each service carries lines and
//! journey patterns. Journey patterns reference timing links rather than
//! concrete clock times, so every qualifying pattern is expanded into a run
//! of synthesized departures at the route's headway.
//!
//! Parsing never fails a request: a malformed document logs a warning and
//! contributes nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use roxmltree::{Document, Node};
use tracing::warn;

use crate::domain::ScheduledDeparture;
use crate::registry::RouteTable;
use crate::synth::timetable_departures;

/// Route number → departures, ordered by scheduled time.
pub type ScheduleMap = HashMap<String, Vec<ScheduledDeparture>>;

/// Errors decoding an upstream XML document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("missing element: {0}")]
    MissingElement(&'static str),
}

/// Decode raw bytes into text, dropping a leading byte-order mark.
pub(crate) fn document_text(bytes: &[u8]) -> Result<&str, DocumentError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.trim_start_matches('\u{feff}'))
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |n| n.has_tag_name(name))
}

/// Text content of a child element, trimmed, if non-empty.
pub(crate) fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Route key for a line: its `id` attribute, else its `LineName`.
fn line_key(line: Node) -> Option<String> {
    line.attribute("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| child_text(line, "LineName"))
        .map(str::to_string)
}

/// Does a journey pattern reference at least one timing link?
fn has_timing_links(pattern: Node) -> bool {
    pattern.descendants().any(|n| {
        n.has_tag_name("JourneyPatternSectionRefs") || n.has_tag_name("JourneyPatternTimingLink")
    })
}

/// Parse a timetable document, failing on malformed input.
pub fn try_parse_schedule<R: Rng + ?Sized>(
    bytes: &[u8],
    routes: &RouteTable,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<ScheduleMap, DocumentError> {
    let doc = Document::parse(document_text(bytes)?)?;
    let services = child(doc.root_element(), "Services")
        .ok_or(DocumentError::MissingElement("Services"))?;

    let mut schedule = ScheduleMap::new();

    for service in children(services, "Service") {
        let patterns = service
            .descendants()
            .filter(|n| n.has_tag_name("JourneyPattern") && has_timing_links(*n))
            .count();

        let Some(lines) = child(service, "Lines") else {
            continue;
        };

        for line in children(lines, "Line") {
            let Some(route) = line_key(line) else {
                continue;
            };

            let frequency = routes.frequency(&route);
            let mut departures: Vec<ScheduledDeparture> = (0..patterns)
                .flat_map(|_| timetable_departures(&mut *rng, now, frequency))
                .collect();

            if departures.is_empty() {
                continue;
            }
            departures.sort_by_key(|d| d.scheduled_time);
            schedule.insert(route, departures);
        }
    }

    Ok(schedule)
}

/// Parse a timetable document, degrading to an empty schedule on error.
pub fn parse_schedule<R: Rng + ?Sized>(
    bytes: &[u8],
    routes: &RouteTable,
    now: DateTime<Utc>,
    rng: &mut R,
) -> ScheduleMap {
    match try_parse_schedule(bytes, routes, now, rng) {
        Ok(schedule) => schedule,
        Err(e) => {
            warn!(error = %e, "Failed to parse timetable document, ignoring it");
            ScheduleMap::new()
        }
    }
}

/// Merge per-dataset schedules in declaration order.
///
/// A later dataset's entry for a route replaces an earlier one outright;
/// departures are never combined across datasets.
pub fn merge_schedules(ordered: impl IntoIterator<Item = ScheduleMap>) -> ScheduleMap {
    ordered
        .into_iter()
        .fold(ScheduleMap::new(), |mut merged, schedule| {
            merged.extend(schedule);
            merged
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BoundingBox, RegistryBuilder};
    use chrono::{Duration, TimeZone};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const TXC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TransXChange xmlns="http://www.transxchange.org.uk/" SchemaVersion="2.4">
  <Services>
    <Service>
      <ServiceCode>PB0001</ServiceCode>
      <Lines>
        <Line id="4">
          <LineName>4 Blaenymaes</LineName>
        </Line>
        <Line>
          <LineName>4A</LineName>
        </Line>
      </Lines>
      <StandardService>
        <JourneyPattern id="JP1">
          <JourneyPatternSectionRefs>JPS1</JourneyPatternSectionRefs>
        </JourneyPattern>
        <JourneyPattern id="JP2">
          <JourneyPatternSectionRefs>JPS2</JourneyPatternSectionRefs>
        </JourneyPattern>
        <JourneyPattern id="JP3"/>
      </StandardService>
    </Service>
    <Service>
      <Lines>
        <Line id="X10"/>
      </Lines>
      <StandardService>
        <JourneyPattern id="JP4"/>
      </StandardService>
    </Service>
  </Services>
</TransXChange>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()
    }

    fn routes() -> RouteTable {
        let bbox = BoundingBox {
            min_lon: 0.0,
            min_lat: 0.0,
            max_lon: 1.0,
            max_lat: 1.0,
        };
        RegistryBuilder::new(bbox)
            .route("4", "Blaenymaes", 15, "First")
            .build()
            .unwrap()
            .routes()
            .clone()
    }

    fn departures_at(mins: &[i64]) -> Vec<ScheduledDeparture> {
        mins.iter()
            .map(|m| {
                let t = now() + Duration::minutes(*m);
                ScheduledDeparture::new(t, t)
            })
            .collect()
    }

    #[test]
    fn parses_lines_and_patterns() {
        let mut rng = StdRng::seed_from_u64(1);
        let schedule = try_parse_schedule(TXC.as_bytes(), &routes(), now(), &mut rng).unwrap();

        // Line id wins over LineName; LineName used when id is absent.
        assert!(schedule.contains_key("4"));
        assert!(schedule.contains_key("4A"));
        assert!(!schedule.contains_key("4 Blaenymaes"));

        // Service without timing-linked patterns contributes nothing.
        assert!(!schedule.contains_key("X10"));

        // Two qualifying patterns of up to 8 departures each.
        let four = &schedule["4"];
        assert!(four.len() >= 14 && four.len() <= 16);
        assert!(four.windows(2).all(|w| w[0].scheduled_time <= w[1].scheduled_time));
        assert!(four.iter().all(|d| d.estimated_time > now()));
        assert!(four.iter().all(|d| (d.scheduled_time - now()).num_minutes() % 15 == 0));

        // Unknown route uses the 30 minute default.
        assert!(schedule["4A"]
            .iter()
            .all(|d| (d.scheduled_time - now()).num_minutes() % 30 == 0));
    }

    #[test]
    fn malformed_document_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(parse_schedule(b"<TransXChange><Services>", &routes(), now(), &mut rng).is_empty());
        assert!(parse_schedule(b"\xff\xfe", &routes(), now(), &mut rng).is_empty());
    }

    #[test]
    fn missing_services_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = try_parse_schedule(b"<TransXChange/>", &routes(), now(), &mut rng).unwrap_err();
        assert!(matches!(err, DocumentError::MissingElement("Services")));
        assert!(parse_schedule(b"<TransXChange/>", &routes(), now(), &mut rng).is_empty());
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let mut rng = StdRng::seed_from_u64(1);
        let with_bom = format!("\u{feff}{TXC}");
        let schedule = try_parse_schedule(with_bom.as_bytes(), &routes(), now(), &mut rng).unwrap();
        assert!(schedule.contains_key("4"));
    }

    #[test]
    fn merge_is_last_write_wins() {
        let first = ScheduleMap::from([
            ("1".to_string(), departures_at(&[5, 10])),
            ("2".to_string(), departures_at(&[7])),
        ]);
        let second = ScheduleMap::from([("1".to_string(), departures_at(&[40]))]);

        let merged = merge_schedules([first, second]);

        assert_eq!(merged["1"], departures_at(&[40]));
        assert_eq!(merged["2"], departures_at(&[7]));
    }

    #[test]
    fn merge_order_matters() {
        let a = ScheduleMap::from([("1".to_string(), departures_at(&[5]))]);
        let b = ScheduleMap::from([("1".to_string(), departures_at(&[50]))]);

        assert_eq!(merge_schedules([a.clone(), b.clone()])["1"], departures_at(&[50]));
        assert_eq!(merge_schedules([b, a])["1"], departures_at(&[5]));
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(merge_schedules(Vec::new()).is_empty());
    }
}
