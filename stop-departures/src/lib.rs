//! Bus departure board server.
//!
//! Aggregates timetable datasets and live vehicle positions from the Bus
//! Open Data Service into ranked upcoming departures for a fixed set of
//! stops, falling back to synthesized departures when upstream data is
//! unavailable.

pub mod aggregate;
pub mod cache;
pub mod clock;
pub mod domain;
pub mod feed;
pub mod live;
pub mod registry;
pub mod schedule;
pub mod synth;
pub mod web;
