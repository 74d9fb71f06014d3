//! Application state for the web layer.

use std::sync::Arc;

use crate::aggregate::ServiceAggregator;
use crate::feed::BodsClient;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Departure aggregator backed by the live upstream client
    pub departures: Arc<ServiceAggregator<BodsClient>>,
}

impl AppState {
    /// Create a new app state.
    pub fn new(departures: ServiceAggregator<BodsClient>) -> Self {
        Self {
            departures: Arc::new(departures),
        }
    }
}
