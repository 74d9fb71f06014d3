//! Web layer for the departure board.
//!
//! Exposes the aggregator's operations as JSON endpoints.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
