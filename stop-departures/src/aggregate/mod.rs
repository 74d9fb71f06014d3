//! Departure aggregation.
//!
//! For each stop, combines synthesized timetable departures, the shared live
//! vehicle snapshot and fallback data into a ranked list, and caches it.
//!
//! Merge order for one stop:
//! 1. cached list, if fresh;
//! 2. timetable datasets, fetched sequentially, last dataset wins per route;
//! 3. live snapshot, fetched concurrently with (2);
//! 4. per route, timetable services or fallback services;
//! 5. live enhancement from the first matching vehicle;
//! 6. rank, truncate, cache.
//!
//! Any timetable fetch failure replaces the whole list with fallback data,
//! cached only briefly so the stop recovers once upstream does.

mod aggregator;

pub use aggregator::{
    AggregatorConfig, CacheReport, DeparturesError, ServiceAggregator, StopServices, apply_live,
    earliest,
};
