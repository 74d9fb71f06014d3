//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::aggregate::{CacheReport, DeparturesError};
use crate::domain::{Service, VehicleObservation};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stops", get(list_stops))
        .route("/api/stops/:id/services", get(stop_services))
        .route("/api/services", get(all_services))
        .route("/api/next", get(next_departure))
        .route("/api/vehicles", get(vehicles))
        .route("/api/cache/stats", get(cache_stats))
        .route("/api/cache/flush", post(flush_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List the registered stops.
async fn list_stops(State(state): State<AppState>) -> Json<ApiResponse<Vec<StopResult>>> {
    let stops = state
        .departures
        .registry()
        .stops()
        .iter()
        .map(StopResult::from_stop)
        .collect();

    Json(ApiResponse::ok(stops))
}

/// Upcoming departures for one stop.
async fn stop_services(
    State(state): State<AppState>,
    Path(stop_id): Path<String>,
) -> Result<Json<ApiResponse<StopServicesResult>>, AppError> {
    let result = state.departures.services_for_stop(&stop_id).await?;
    let stop_name = state
        .departures
        .registry()
        .get(&stop_id)
        .map(|s| s.display_name.clone())
        .unwrap_or_default();

    let body = StopServicesResult {
        stop_id: result.stop_id,
        stop_name,
        services: result.services.to_vec(),
    };

    Ok(Json(ApiResponse::cached(body, result.from_cache)))
}

/// Upcoming departures for every stop.
async fn all_services(State(state): State<AppState>) -> Json<ApiResponse<Vec<StopServicesResult>>> {
    let registry = state.departures.registry();
    let all = state.departures.all_stops().await;
    let cached = all.iter().all(|s| s.from_cache);

    let results = all
        .into_iter()
        .map(|s| StopServicesResult {
            stop_name: registry
                .get(&s.stop_id)
                .map(|stop| stop.display_name.clone())
                .unwrap_or_default(),
            services: s.services.to_vec(),
            stop_id: s.stop_id,
        })
        .collect();

    Json(ApiResponse::cached(results, cached))
}

/// The earliest departure across all stops.
async fn next_departure(State(state): State<AppState>) -> Json<ApiResponse<Option<Service>>> {
    Json(ApiResponse::ok(state.departures.next_global_departure().await))
}

/// Latest live vehicle snapshot.
async fn vehicles(State(state): State<AppState>) -> Json<ApiResponse<Vec<VehicleObservation>>> {
    let vehicles = state.departures.vehicle_observations().await;
    Json(ApiResponse::ok(vehicles.to_vec()))
}

/// Cache key counts and hit rates.
async fn cache_stats(State(state): State<AppState>) -> Json<ApiResponse<CacheReport>> {
    Json(ApiResponse::ok(state.departures.cache_stats().await))
}

/// Drop every cached entry and report the emptied caches.
async fn flush_cache(State(state): State<AppState>) -> Json<ApiResponse<CacheReport>> {
    state.departures.flush_caches().await;
    info!("Caches flushed");
    Json(ApiResponse::ok(state.departures.cache_stats().await))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound { message: String },
}

impl From<DeparturesError> for AppError {
    fn from(e: DeparturesError) -> Self {
        match e {
            DeparturesError::UnknownStop(_) => AppError::NotFound {
                message: e.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
        };

        warn!(%status, %message, "Request failed");

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stop_is_not_found() {
        let err = AppError::from(DeparturesError::UnknownStop("NOPE".into()));

        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_found_keeps_the_stop_id() {
        let AppError::NotFound { message } =
            AppError::from(DeparturesError::UnknownStop("NOPE".into()));
        assert_eq!(message, "unknown stop: NOPE");
    }
}
