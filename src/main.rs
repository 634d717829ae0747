use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use geofence_sync::client::geofences::HttpGeofenceRepository;
use geofence_sync::client::http;
use geofence_sync::client::locations::HttpLocationFeed;
use geofence_sync::observability::metrics::Metrics;
use geofence_sync::sync::controller::GeofenceController;
use geofence_sync::sync::poller::LocationPoller;
use geofence_sync::{config, error};

/// Headless harness: loads the geofence collection once and keeps the
/// live-location poll loop running until ctrl-c. The map view embeds the
/// same wiring.
///
/// Address search is keystroke-driven, so it only runs inside the view
/// layer: the search box constructs an `AddressSearch` over an
/// `HttpGeocoder` built from `Config::geocode_base_url` and
/// `Config::geocode_debounce`. There is nothing for it to do headless.
#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let http_client = http::build_client(config.http_timeout)?;
    let metrics = Metrics::new();

    let repository = Arc::new(HttpGeofenceRepository::new(
        http_client.clone(),
        config.api_base_url.clone(),
    ));
    let feed = Arc::new(HttpLocationFeed::new(
        http_client,
        config.api_base_url.clone(),
    ));

    let controller = GeofenceController::new(repository, metrics.clone());
    controller.refresh().await?;
    tracing::info!(
        geofences = controller.geofences().len(),
        api = %config.api_base_url,
        "geofence collection loaded"
    );

    let poller = LocationPoller::new(feed, metrics);
    let poller_handle = poller.spawn(config.poll_interval);

    shutdown_signal().await;

    poller_handle.stop();
    tracing::info!("location poller stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
