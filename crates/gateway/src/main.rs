//! Airwave API Gateway
//!
//! The single HTTP entry point of the fleet registry.
//! Handles:
//! - Tenant and admin authentication
//! - Relay registration and heartbeats (rate limited)
//! - Room creation and publisher join
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod state;


use airwave_common::{
    auth,
    clock::{SharedClock, SystemClock},
    config::AppConfig,
    db::DbPool,
    fleet::{FleetEvent, FleetEvents},
    metrics,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

pub use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    metrics::init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting Airwave API Gateway v{}",
        airwave_common::VERSION
    );

    let metrics_handle = if config.observability.metrics_enabled {
        Some(install_prometheus()?)
    } else {
        None
    };

    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let clock: SharedClock = Arc::new(SystemClock);
    let state = AppState::new(config, db, clock, metrics_handle)?;
    if !state.admin.is_enabled() {
        tracing::warn!("auth.admin_token is not set, admin routes are disabled");
    }

    tokio::spawn(log_fleet_events(state.fleet.events.clone()));

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn install_prometheus() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("credential_scan_duration_seconds".to_string()),
            metrics::CREDENTIAL_SCAN_BUCKETS,
        )?
        .install_recorder()?;
    metrics::register_metrics();
    Ok(handle)
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Probes (no auth)
    let probes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics));

    // Relay endpoints authenticated by the key in the body
    let relay_routes = Router::new()
        .route("/relays/register", post(handlers::relays::register))
        .route("/relays/heartbeat", post(handlers::relays::heartbeat))
        .route_layer(from_fn_with_state(
            state.relay_limiter.clone(),
            middleware::rate_limit::rate_limit,
        ));

    // Tenant endpoints (API key bearer)
    let tenant_routes = Router::new()
        .route("/relays", get(handlers::relays::list_relays))
        .route("/relays/keys", post(handlers::relays::issue_key))
        .route("/relays/online", get(handlers::relays::list_online))
        .route("/relays/{id}", delete(handlers::relays::revoke))
        .route("/rooms", post(handlers::rooms::create_room).get(handlers::rooms::list_rooms))
        .route("/rooms/{id}", get(handlers::rooms::get_room))
        .route("/rooms/{id}/publishers", post(handlers::rooms::create_publisher))
        .route_layer(from_fn_with_state(
            state.fleet.tenants.clone(),
            auth::require_tenant,
        ));

    // Publisher join (token in body)
    let join_routes = Router::new().route("/join/{slug}", post(handlers::join::join));

    // Admin bootstrap (admin bearer)
    let admin_routes = Router::new()
        .route("/admin/tenants", post(handlers::tenants::create_tenant))
        .route("/admin/tenants/{id}/rotate-key", post(handlers::tenants::rotate_key))
        .route("/admin/relays/online", get(handlers::tenants::list_all_online))
        .route_layer(from_fn_with_state(state.admin.clone(), auth::require_admin));

    let api_routes = Router::new()
        .merge(probes)
        .merge(relay_routes)
        .merge(tenant_routes)
        .merge(join_routes)
        .merge(admin_routes)
        .route_layer(from_fn(middleware::metrics::track_requests));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Log fleet signals until the channel closes
async fn log_fleet_events(events: FleetEvents) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(FleetEvent::RelayOnline {
                relay_id,
                tenant_id,
                name,
                url,
            }) => {
                info!(relay_id = %relay_id, tenant_id = %tenant_id, name = %name, url = %url, "Relay online");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Fleet event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
