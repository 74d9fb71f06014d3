//! Per-stop merge policy and cross-stop queries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheStats, TimedCache};
use crate::clock::{Clock, SystemClock};
use crate::domain::{Service, ServiceSource, Stop, VehicleObservation, rank};
use crate::feed::{FeedError, FeedSource};
use crate::live::parse_vehicles;
use crate::registry::StopRegistry;
use crate::schedule::{ScheduleMap, merge_schedules, parse_schedule};
use crate::synth::{EtaEstimator, FallbackSynthesizer, SimulatedDistanceEta};

/// Key of the single shared live snapshot.
const LIVE_SNAPSHOT_KEY: &str = "vehicles";

/// Errors surfaced to callers. Upstream problems never appear here; they
/// are absorbed into fallback data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeparturesError {
    #[error("unknown stop: {0}")]
    UnknownStop(String),
}

/// Configuration for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Cache for per-stop service lists.
    pub timetable_cache: CacheConfig,

    /// Cache for the shared live vehicle snapshot.
    pub live_cache: CacheConfig,

    /// TTL for stop lists built from fallback data after an upstream failure.
    pub fallback_ttl: Duration,

    /// TTL for the empty snapshot cached after a live feed failure.
    pub live_failure_ttl: Duration,

    /// Maximum services returned for a stop.
    pub max_services: usize,

    /// Maximum services returned when the stop fell back entirely.
    pub max_fallback_services: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            timetable_cache: CacheConfig::timetable(),
            live_cache: CacheConfig::live(),
            fallback_ttl: Duration::from_secs(60),
            live_failure_ttl: Duration::from_secs(10),
            max_services: 8,
            max_fallback_services: 6,
        }
    }
}

/// Ranked services for one stop.
#[derive(Debug, Clone)]
pub struct StopServices {
    pub stop_id: String,
    pub services: Arc<Vec<Service>>,
    /// True when served from the cache without touching upstream.
    pub from_cache: bool,
}

/// Key counts and hit/miss counters of both caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    pub timetable_cache: CacheStats,
    pub live_cache: CacheStats,
}

/// Aggregates timetable, live and fallback data into ranked departures.
pub struct ServiceAggregator<F> {
    feed: F,
    registry: Arc<StopRegistry>,
    timetable_cache: TimedCache<String, Arc<Vec<Service>>>,
    live_cache: TimedCache<String, Arc<Vec<VehicleObservation>>>,
    clock: Arc<dyn Clock>,
    eta: Arc<dyn EtaEstimator>,
    config: AggregatorConfig,
}

impl<F: FeedSource> ServiceAggregator<F> {
    /// Create an aggregator using the system clock and the default ETA
    /// estimator.
    pub fn new(feed: F, registry: Arc<StopRegistry>, config: AggregatorConfig) -> Self {
        Self {
            feed,
            registry,
            timetable_cache: TimedCache::new(&config.timetable_cache),
            live_cache: TimedCache::new(&config.live_cache),
            clock: Arc::new(SystemClock),
            eta: Arc::new(SimulatedDistanceEta::default()),
            config,
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the ETA estimator.
    pub fn with_eta(mut self, eta: Arc<dyn EtaEstimator>) -> Self {
        self.eta = eta;
        self
    }

    /// The registry this aggregator serves.
    pub fn registry(&self) -> &StopRegistry {
        &self.registry
    }

    /// Ranked services for a registered stop.
    pub async fn services_for_stop(&self, stop_id: &str) -> Result<StopServices, DeparturesError> {
        let stop = self
            .registry
            .get(stop_id)
            .ok_or_else(|| DeparturesError::UnknownStop(stop_id.to_string()))?;

        Ok(self.stop_services(stop).await)
    }

    /// Ranked services for every registered stop, in registry order.
    pub async fn all_stops(&self) -> Vec<StopServices> {
        let futures = self
            .registry
            .stops()
            .iter()
            .map(|stop| self.stop_services(stop));

        join_all(futures).await
    }

    /// The earliest departure across all stops, if any.
    pub async fn next_global_departure(&self) -> Option<Service> {
        earliest(&self.all_stops().await)
    }

    /// Current live vehicle snapshot; empty if the feed is unavailable.
    pub async fn vehicle_observations(&self) -> Arc<Vec<VehicleObservation>> {
        let (vehicles, hit) = self
            .live_cache
            .get_with(LIVE_SNAPSHOT_KEY.to_string(), self.fetch_vehicles())
            .await;

        if !hit {
            debug!(vehicles = vehicles.len(), "Refreshed live vehicle snapshot");
        }
        vehicles
    }

    /// Counters of both caches.
    pub async fn cache_stats(&self) -> CacheReport {
        CacheReport {
            timetable_cache: self.timetable_cache.stats().await,
            live_cache: self.live_cache.stats().await,
        }
    }

    /// Empty both caches.
    pub async fn flush_caches(&self) {
        self.timetable_cache.flush_all().await;
        self.live_cache.flush_all().await;
    }

    async fn stop_services(&self, stop: &Stop) -> StopServices {
        let (services, from_cache) = self
            .timetable_cache
            .get_with(stop.id.clone(), self.build_services(stop))
            .await;

        StopServices {
            stop_id: stop.id.clone(),
            services,
            from_cache,
        }
    }

    /// Build a stop's list from upstream data. Returns the list and the TTL
    /// override to cache it with.
    async fn build_services(&self, stop: &Stop) -> (Arc<Vec<Service>>, Option<Duration>) {
        let now = self.clock.now();

        let (schedule, vehicles) =
            tokio::join!(self.fetch_schedule(stop, now), self.vehicle_observations());

        match schedule {
            Ok(schedule) => {
                let services = self.assemble(stop, &schedule, &vehicles, now);
                (Arc::new(services), None)
            }
            Err(e) => {
                warn!(stop = %stop.id, error = %e, "Timetable fetch failed, serving fallback departures");
                let services = self.fallback(stop, now);
                (Arc::new(services), Some(self.config.fallback_ttl))
            }
        }
    }

    /// Fetch and merge the stop's datasets in declaration order.
    async fn fetch_schedule(&self, stop: &Stop, now: DateTime<Utc>) -> Result<ScheduleMap, FeedError> {
        let mut schedules = Vec::with_capacity(stop.dataset_ids.len());

        for dataset_id in &stop.dataset_ids {
            let metadata = self.feed.fetch_dataset_metadata(dataset_id).await?;
            let body = self.feed.fetch_dataset_body(&metadata.download_url).await?;
            let schedule = parse_schedule(&body, self.registry.routes(), now, &mut rand::rng());
            debug!(
                stop = %stop.id,
                dataset = %dataset_id,
                routes = schedule.len(),
                "Parsed timetable dataset"
            );
            schedules.push(schedule);
        }

        Ok(merge_schedules(schedules))
    }

    async fn fetch_vehicles(&self) -> (Arc<Vec<VehicleObservation>>, Option<Duration>) {
        let bbox = self.registry.live_bounding_box();

        match self.feed.fetch_live_feed(&bbox).await {
            Ok(body) => (Arc::new(parse_vehicles(&body, self.clock.now())), None),
            Err(e) => {
                warn!(error = %e, "Live feed fetch failed, continuing without vehicles");
                (Arc::new(Vec::new()), Some(self.config.live_failure_ttl))
            }
        }
    }

    /// Timetable or per-route fallback services, live-enhanced and ranked.
    fn assemble(
        &self,
        stop: &Stop,
        schedule: &ScheduleMap,
        vehicles: &[VehicleObservation],
        now: DateTime<Utc>,
    ) -> Vec<Service> {
        let synth = FallbackSynthesizer::new(stop, self.registry.routes());
        let mut rng = rand::rng();
        let mut services = Vec::new();

        for route in &stop.route_numbers {
            match schedule.get(route) {
                Some(departures) if !departures.is_empty() => {
                    services.extend(synth.services(route, departures, ServiceSource::Timetable));
                }
                _ => services.extend(synth.route_fallback(&mut rng, route, now)),
            }
        }

        apply_live(&mut services, vehicles, self.eta.as_ref(), now);
        rank(&mut services, self.config.max_services);
        services
    }

    /// Pure fallback list used when upstream timetable data is unavailable.
    fn fallback(&self, stop: &Stop, now: DateTime<Utc>) -> Vec<Service> {
        let synth = FallbackSynthesizer::new(stop, self.registry.routes());
        let mut services = synth.stop_fallback(&mut rand::rng(), now);
        rank(&mut services, self.config.max_fallback_services);
        services
    }
}

/// Re-time services that have a tracked vehicle on their route.
///
/// The first matching vehicle wins; there is no proximity disambiguation.
pub fn apply_live(
    services: &mut [Service],
    vehicles: &[VehicleObservation],
    eta: &dyn EtaEstimator,
    now: DateTime<Utc>,
) {
    for service in services.iter_mut() {
        let Some(vehicle) = vehicles.iter().find(|v| v.serves_route(&service.route_number)) else {
            continue;
        };
        let minutes = i64::from(eta.eta_minutes(vehicle).max(1));
        service.apply_live_estimate(now + chrono::Duration::minutes(minutes));
    }
}

/// The service with the earliest effective time; ties go to the first seen.
pub fn earliest(stops: &[StopServices]) -> Option<Service> {
    stops
        .iter()
        .flat_map(|s| s.services.iter())
        .min_by_key(|s| s.effective_time())
        .cloned()
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
