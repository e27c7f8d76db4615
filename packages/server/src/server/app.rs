//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::middleware::require_bearer;
use crate::server::routes::{
    delete_handler, download_handler, health_handler, initiate_handler, respond_handler,
    upload_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the Axum application router
///
/// `rate_limit_enabled` gates the per-IP governor on the auth routes; the
/// test harness turns it off because oneshot requests carry no peer address.
pub fn build_app(deps: Arc<ServerDeps>, rate_limit_enabled: bool) -> Router {
    let state = AppState { deps };

    // CORS configuration - browser clients call both surfaces directly
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // Auth endpoints: unauthenticated, so rate limited per IP
    // (see middleware/rate_limit.rs for the reasoning behind the numbers)
    let mut auth_routes = Router::new()
        .route("/auth/initiate", post(initiate_handler))
        .route("/auth/respond", post(respond_handler));

    if rate_limit_enabled {
        let rate_limit_config = std::sync::Arc::new(
            GovernorConfigBuilder::default()
                .per_second(1) // Base rate: 1 request per second
                .burst_size(5) // Allow bursts up to 5
                .use_headers() // Extract IP from X-Forwarded-For header
                .finish()
                .expect("Rate limiter configuration is valid and should never fail"),
        );
        auth_routes = auth_routes.layer(GovernorLayer {
            config: rate_limit_config,
        });
    }

    // Sync endpoints: bearer credential required before any store access
    let sync_routes = Router::new()
        .route("/sync/upload", post(upload_handler))
        .route("/sync/download", get(download_handler))
        .route("/tasks/delete", post(delete_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(auth_routes)
        .merge(sync_routes)
        // Health check (no auth, no rate limit)
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
