//! Ruleset Hub API Server
//!
//! Thin REST surface over the rules subsystem: ruleset deployment,
//! deployment status and the console geofence contract.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Rulesets
        .route("/api/rulesets", post(handlers::create_ruleset).delete(handlers::delete_ruleset))
        .route("/api/rulesets/deployments", get(handlers::list_deployments))
        // Geofences
        .route("/api/geofences/predicates", post(handlers::process_location_predicates))
        .route("/api/geofences/:asset_id", get(handlers::get_asset_geofences))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
