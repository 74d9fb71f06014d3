//! Synthetic departure generation and ETA estimation.
//!
//! Timetable documents carry journey patterns, not concrete times, so both
//! the timetable path and the fallback path synthesize departures from a
//! route's headway plus uniform random variance. The shapes are fixed; only
//! the variance is random.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::domain::{ScheduledDeparture, Service, ServiceSource, Stop, VehicleObservation};
use crate::registry::RouteTable;

/// Departures synthesized per timetabled journey pattern.
pub const TIMETABLE_DEPARTURES: usize = 8;

/// Departures synthesized per route when a route has no timetable data.
pub const FALLBACK_DEPARTURES: usize = 4;

/// Variance applied to timetable departures (± seconds).
const TIMETABLE_VARIANCE_SECS: i64 = 2 * 60;

/// Variance applied to fallback departures (± seconds).
const FALLBACK_VARIANCE_SECS: i64 = 3 * 60;

/// Simulated distance range for the default ETA estimator (km).
const MAX_SIMULATED_DISTANCE_KM: f64 = 3.0;

/// Average urban bus speed (km/h).
const AVERAGE_SPEED_KMH: f64 = 25.0;

fn perturb<R: Rng + ?Sized>(rng: &mut R, time: DateTime<Utc>, variance_secs: i64) -> DateTime<Utc> {
    time + Duration::seconds(rng.random_range(-variance_secs..=variance_secs))
}

/// Synthesize departures for one timetabled journey pattern.
///
/// Departures are spaced by `frequency` starting at `now`; any whose
/// perturbed time is at or before `now` is dropped.
pub fn timetable_departures<R: Rng + ?Sized>(
    rng: &mut R,
    now: DateTime<Utc>,
    frequency: Duration,
) -> Vec<ScheduledDeparture> {
    (0..TIMETABLE_DEPARTURES as i32)
        .filter_map(|i| {
            let scheduled = now + frequency * i;
            let estimated = perturb(&mut *rng, scheduled, TIMETABLE_VARIANCE_SECS);
            (estimated > now).then(|| ScheduledDeparture::new(scheduled, estimated))
        })
        .collect()
}

/// Synthesize fallback departures for one route.
///
/// The first departure is one headway after `now`, so none are dropped.
pub fn fallback_departures<R: Rng + ?Sized>(
    rng: &mut R,
    now: DateTime<Utc>,
    frequency: Duration,
) -> Vec<ScheduledDeparture> {
    (1..=FALLBACK_DEPARTURES as i32)
        .map(|i| {
            let scheduled = now + frequency * i;
            ScheduledDeparture::new(scheduled, perturb(&mut *rng, scheduled, FALLBACK_VARIANCE_SECS))
        })
        .collect()
}

/// Builds `Service` records for a stop from departures or from nothing.
pub struct FallbackSynthesizer<'a> {
    stop: &'a Stop,
    routes: &'a RouteTable,
}

impl<'a> FallbackSynthesizer<'a> {
    pub fn new(stop: &'a Stop, routes: &'a RouteTable) -> Self {
        Self { stop, routes }
    }

    /// Wrap departures for a route as services from the given source.
    pub fn services(
        &self,
        route: &str,
        departures: &[ScheduledDeparture],
        source: ServiceSource,
    ) -> Vec<Service> {
        let destination = self.routes.destination(route);
        let operator = self
            .routes
            .operator(route)
            .unwrap_or_else(|| self.stop.primary_operator());

        departures
            .iter()
            .map(|d| {
                Service::new(
                    route,
                    destination,
                    operator,
                    d.scheduled_time,
                    d.estimated_time,
                    source,
                )
            })
            .collect()
    }

    /// Fallback services for a single route.
    pub fn route_fallback<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        route: &str,
        now: DateTime<Utc>,
    ) -> Vec<Service> {
        let departures = fallback_departures(rng, now, self.routes.frequency(route));
        self.services(route, &departures, ServiceSource::Fallback)
    }

    /// Fallback services for every route the stop serves, unranked.
    pub fn stop_fallback<R: Rng + ?Sized>(&self, rng: &mut R, now: DateTime<Utc>) -> Vec<Service> {
        self.stop
            .route_numbers
            .iter()
            .flat_map(|route| self.route_fallback(&mut *rng, route, now))
            .collect()
    }
}

/// Estimates minutes until a tracked vehicle reaches the stop.
pub trait EtaEstimator: Send + Sync {
    /// Positive whole minutes.
    fn eta_minutes(&self, vehicle: &VehicleObservation) -> u32;
}

/// Heuristic estimator: a random distance travelled at average urban speed.
///
/// Not physically meaningful; it only yields plausible values.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedDistanceEta {
    max_distance_km: f64,
    speed_kmh: f64,
}

impl Default for SimulatedDistanceEta {
    fn default() -> Self {
        Self {
            max_distance_km: MAX_SIMULATED_DISTANCE_KM,
            speed_kmh: AVERAGE_SPEED_KMH,
        }
    }
}

impl SimulatedDistanceEta {
    /// Estimator over distances in `0..max_distance_km`.
    ///
    /// Returns `None` unless both values are finite and positive.
    pub fn new(max_distance_km: f64, speed_kmh: f64) -> Option<Self> {
        let valid = |x: f64| x.is_finite() && x > 0.0;
        (valid(max_distance_km) && valid(speed_kmh)).then_some(Self {
            max_distance_km,
            speed_kmh,
        })
    }

    /// Minutes to cover `distance_km`, at least one.
    pub fn minutes_for(&self, distance_km: f64) -> u32 {
        let mins = (distance_km / self.speed_kmh * 60.0).round();
        (mins as u32).max(1)
    }
}

impl EtaEstimator for SimulatedDistanceEta {
    fn eta_minutes(&self, _vehicle: &VehicleObservation) -> u32 {
        let distance = rand::rng().random_range(0.0..self.max_distance_km);
        self.minutes_for(distance)
    }
}
