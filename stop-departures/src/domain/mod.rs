//! Domain types for the departure aggregator.
//!
//! Stops are static configuration; departures, observations and services are
//! created per request cycle and discarded once answered or cached.

mod departure;
mod service;
mod stop;
mod vehicle;

pub use departure::ScheduledDeparture;
pub use service::{Service, ServiceSource, ServiceStatus, classify, rank};
pub use stop::Stop;
pub use vehicle::VehicleObservation;
