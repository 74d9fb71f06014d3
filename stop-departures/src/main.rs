use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stop_departures::aggregate::{AggregatorConfig, ServiceAggregator};
use stop_departures::feed::{BodsClient, FeedConfig};
use stop_departures::registry::StopRegistry;
use stop_departures::web::{AppState, create_router};

/// Default listen address.
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Read a duration in whole seconds from the environment.
fn env_secs(name: &str) -> Option<Duration> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(var = name, value = %value, "Ignoring invalid duration");
            None
        }
    }
}

/// Read a positive count from the environment.
fn env_count(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(var = name, value = %value, "Ignoring invalid count");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stop_departures=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Credentials
    let api_key = std::env::var("BODS_API_KEY").unwrap_or_else(|_| {
        warn!("BODS_API_KEY not set, upstream calls will fail and fallback data will be served");
        String::new()
    });

    let mut feed_config = FeedConfig::new(api_key);
    if let Ok(base_url) = std::env::var("BODS_BASE_URL") {
        feed_config = feed_config.with_base_url(base_url);
    }
    if let Some(timeout) = env_secs("BODS_TIMEOUT_SECS") {
        feed_config = feed_config.with_timeout(timeout);
    }
    if let Some(n) = env_count("BODS_MAX_CONCURRENT") {
        feed_config = feed_config.with_max_concurrent(n);
    }
    let feed = BodsClient::new(feed_config)?;

    // Stops
    let registry = match std::env::var("STOPS_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading stop registry");
            StopRegistry::load(&path)?
        }
        Err(_) => StopRegistry::builtin(),
    };
    info!(stops = registry.len(), "Stop registry ready");

    // Caches
    let mut config = AggregatorConfig::default();
    if let Some(ttl) = env_secs("TIMETABLE_TTL_SECS") {
        config.timetable_cache = config.timetable_cache.with_ttl(ttl);
    }
    if let Some(ttl) = env_secs("LIVE_TTL_SECS") {
        config.live_cache = config.live_cache.with_ttl(ttl);
    }

    let departures = ServiceAggregator::new(feed, registry.into(), config);
    let app = create_router(AppState::new(departures));

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()?;
    info!(%addr, "Departure board listening");
    info!("  GET  /health                  - Health check");
    info!("  GET  /api/stops               - Registered stops");
    info!("  GET  /api/stops/:id/services  - Departures for one stop");
    info!("  GET  /api/services            - Departures for every stop");
    info!("  GET  /api/next                - Next departure anywhere");
    info!("  GET  /api/vehicles            - Live vehicle snapshot");
    info!("  GET  /api/cache/stats         - Cache statistics");
    info!("  POST /api/cache/flush         - Empty the caches");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
