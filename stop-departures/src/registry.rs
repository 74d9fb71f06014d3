//! Static stop registry and route lookup tables.
//!
//! Loaded once at startup, either from a YAML file or from the built-in
//! defaults, and never mutated afterwards. Adding a stop or a route is a
//! configuration change only.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::Stop;

/// Headway assumed for routes missing from the route table.
const DEFAULT_FREQUENCY_MINS: u32 = 30;

/// Destination label for routes missing from the route table.
const DEFAULT_FALLBACK_DESTINATION: &str = "Town Centre";

/// Errors loading or validating the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read registry file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse registry: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("stop {0} serves no routes")]
    NoRoutes(String),

    #[error("duplicate stop id: {0}")]
    DuplicateStop(String),

    #[error("route {0} has a zero frequency")]
    ZeroFrequency(String),
}

/// Geographic area covered by the live vehicle feed.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Returns the box as "minLon,minLat,maxLon,maxLat".
    pub fn to_query_string(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Per-route configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    pub destination: Option<String>,
    pub frequency_mins: Option<u32>,
    pub operator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopConfig {
    id: String,
    display_name: String,
    #[serde(default)]
    operators: Vec<String>,
    route_numbers: Vec<String>,
    #[serde(default)]
    dataset_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    live_bounding_box: BoundingBox,
    #[serde(default)]
    default_frequency_mins: Option<u32>,
    #[serde(default)]
    fallback_destination: Option<String>,
    #[serde(default)]
    routes: HashMap<String, RouteConfig>,
    stops: Vec<StopConfig>,
}

/// Route → destination / frequency / operator lookups.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<String, RouteConfig>,
    default_frequency_mins: u32,
    fallback_destination: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            default_frequency_mins: DEFAULT_FREQUENCY_MINS,
            fallback_destination: DEFAULT_FALLBACK_DESTINATION.to_string(),
        }
    }
}

impl RouteTable {
    /// Estimated headway between departures on a route.
    pub fn frequency(&self, route: &str) -> Duration {
        let mins = self
            .routes
            .get(route)
            .and_then(|r| r.frequency_mins)
            .unwrap_or(self.default_frequency_mins);
        Duration::minutes(i64::from(mins))
    }

    /// Destination shown for a route, or the generic label.
    pub fn destination(&self, route: &str) -> &str {
        self.routes
            .get(route)
            .and_then(|r| r.destination.as_deref())
            .unwrap_or(&self.fallback_destination)
    }

    /// Operator running a route, if configured.
    pub fn operator(&self, route: &str) -> Option<&str> {
        self.routes.get(route).and_then(|r| r.operator.as_deref())
    }
}

/// Immutable set of registered stops.
#[derive(Debug, Clone)]
pub struct StopRegistry {
    stops: Vec<Stop>,
    index: HashMap<String, usize>,
    routes: RouteTable,
    live_bounding_box: BoundingBox,
}

impl StopRegistry {
    /// Load a registry from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a registry from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(content)?;

        let mut builder = RegistryBuilder::new(file.live_bounding_box);
        if let Some(mins) = file.default_frequency_mins {
            builder = builder.default_frequency(mins);
        }
        if let Some(label) = file.fallback_destination {
            builder = builder.fallback_destination(label);
        }
        for (route, config) in file.routes {
            builder.routes.routes.insert(route, config);
        }
        for s in file.stops {
            builder.stops.push(Stop {
                id: s.id,
                display_name: s.display_name,
                operators: s.operators,
                route_numbers: s.route_numbers,
                dataset_ids: s.dataset_ids,
            });
        }

        builder.build()
    }

    /// The built-in registry used when no configuration file is supplied.
    pub fn builtin() -> Self {
        let bbox = BoundingBox {
            min_lon: -4.02,
            min_lat: 51.58,
            max_lon: -3.88,
            max_lat: 51.66,
        };

        RegistryBuilder::new(bbox)
            .route("4", "Blaenymaes", 15, "First Cymru")
            .route("4A", "Penlan", 20, "First Cymru")
            .route("10", "Singleton Hospital", 12, "First Cymru")
            .route("X10", "Cardiff", 60, "First Cymru")
            .route("2B", "Mumbles", 30, "Adventure Travel")
            .stop(
                "quadrant-a",
                "Quadrant Bus Station Stand A",
                &["First Cymru"],
                &["4", "4A", "10"],
                &["3156", "3157"],
            )
            .stop(
                "quadrant-f",
                "Quadrant Bus Station Stand F",
                &["First Cymru"],
                &["X10"],
                &["3156"],
            )
            .stop(
                "kingsway-b",
                "The Kingsway Stop B",
                &["Adventure Travel", "First Cymru"],
                &["2B", "10"],
                &["6820", "3157"],
            )
            .build()
            .expect("built-in registry is valid")
    }

    /// Look up a stop by id.
    pub fn get(&self, id: &str) -> Option<&Stop> {
        self.index.get(id).map(|&i| &self.stops[i])
    }

    /// All stops in declaration order.
    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    /// Route lookup tables.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Area queried for live vehicle positions.
    pub fn live_bounding_box(&self) -> BoundingBox {
        self.live_bounding_box
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// Fluent builder for registries.
#[derive(Debug)]
pub struct RegistryBuilder {
    stops: Vec<Stop>,
    routes: RouteTable,
    live_bounding_box: BoundingBox,
}

impl RegistryBuilder {
    pub fn new(live_bounding_box: BoundingBox) -> Self {
        Self {
            stops: Vec::new(),
            routes: RouteTable::default(),
            live_bounding_box,
        }
    }

    /// Set the headway assumed for unknown routes.
    pub fn default_frequency(mut self, mins: u32) -> Self {
        self.routes.default_frequency_mins = mins;
        self
    }

    /// Set the destination label for unknown routes.
    pub fn fallback_destination(mut self, label: impl Into<String>) -> Self {
        self.routes.fallback_destination = label.into();
        self
    }

    /// Add a route table entry.
    pub fn route(mut self, route: &str, destination: &str, frequency_mins: u32, operator: &str) -> Self {
        self.routes.routes.insert(
            route.to_string(),
            RouteConfig {
                destination: Some(destination.to_string()),
                frequency_mins: Some(frequency_mins),
                operator: Some(operator.to_string()),
            },
        );
        self
    }

    /// Add a stop.
    pub fn stop(
        mut self,
        id: &str,
        display_name: &str,
        operators: &[&str],
        route_numbers: &[&str],
        dataset_ids: &[&str],
    ) -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.stops.push(Stop {
            id: id.to_string(),
            display_name: display_name.to_string(),
            operators: owned(operators),
            route_numbers: owned(route_numbers),
            dataset_ids: owned(dataset_ids),
        });
        self
    }

    /// Validate and build the registry.
    pub fn build(self) -> Result<StopRegistry, RegistryError> {
        if self.routes.default_frequency_mins == 0 {
            return Err(RegistryError::ZeroFrequency("<default>".to_string()));
        }
        for (route, config) in &self.routes.routes {
            if config.frequency_mins == Some(0) {
                return Err(RegistryError::ZeroFrequency(route.clone()));
            }
        }

        let mut index = HashMap::with_capacity(self.stops.len());
        let mut stops = Vec::with_capacity(self.stops.len());

        for mut stop in self.stops {
            if stop.route_numbers.is_empty() {
                return Err(RegistryError::NoRoutes(stop.id));
            }
            if index.contains_key(&stop.id) {
                return Err(RegistryError::DuplicateStop(stop.id));
            }

            let mut seen = HashSet::new();
            stop.operators.retain(|op| seen.insert(op.clone()));

            index.insert(stop.id.clone(), stops.len());
            stops.push(stop);
        }

        Ok(StopRegistry {
            stops,
            index,
            routes: self.routes,
            live_bounding_box: self.live_bounding_box,
        })
    }
}
