//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use ruleset_hub_core::{
    CreateRulesetRequest, DeleteRulesetRequest, LocationPredicatesRequest, Ruleset, RulesetScope,
};
use ruleset_hub_engine::{DeploymentInfo, RulesetDeployment};
use ruleset_hub_storage::RulesetStorage;
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiError, AppState};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDeployments {
    pub scope: RulesetScope,
    pub running: bool,
    pub deployments: Vec<DeploymentInfo>,
}

// ==================== Ruleset Handlers ====================

/// Store a ruleset version and redeploy it within its scope
pub async fn create_ruleset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRulesetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Ruleset name must not be empty".to_string()));
    }

    let existing = state.storage.get_latest(&req.scope, &req.name).await?;
    let ruleset = match existing {
        Some(existing) => {
            let mut next = existing.new_version(req.rules);
            next.lang = req.lang;
            next
        }
        None => Ruleset::new(req.name, req.lang, req.scope, req.rules),
    };
    let saved = RulesetStorage::save(state.storage.as_ref(), ruleset).await?;

    tracing::info!(
        ruleset = %saved.name,
        version = saved.version,
        scope = %saved.scope,
        "Stored ruleset"
    );

    // Scripts may run up to their deadline, keep them off the async workers
    let scope = saved.scope.clone();
    let compilers = state.compilers.clone();
    let facades = state.facades.clone();
    let deployment =
        tokio::task::spawn_blocking(move || RulesetDeployment::compiled(saved, compilers, &facades))
            .await
            .map_err(|e| ApiError::Internal(format!("Compilation task failed: {}", e)))?;

    let mut engines = state.engines.write().await;
    let engine = engines
        .entry(scope.clone())
        .or_insert_with(|| state.new_engine(scope));
    let info = engine
        .install(deployment)
        .map(|deployment| deployment.info())
        .ok_or_else(|| ApiError::Conflict("A newer version of the ruleset is already deployed".to_string()))?;

    Ok((StatusCode::CREATED, Json(info)))
}

/// Delete every version of a ruleset and undeploy it
pub async fn delete_ruleset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRulesetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    RulesetStorage::delete(state.storage.as_ref(), &req.scope, &req.name).await?;

    let mut engines = state.engines.write().await;
    if let Some(engine) = engines.get_mut(&req.scope) {
        engine.remove_ruleset(&req.name);
    }

    tracing::info!(ruleset = %req.name, scope = %req.scope, "Deleted ruleset");
    Ok(StatusCode::NO_CONTENT)
}

/// Status of every deployment, grouped by scope
pub async fn list_deployments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engines = state.engines.read().await;
    let mut scopes: Vec<ScopeDeployments> = engines
        .values()
        .map(|engine| ScopeDeployments {
            scope: engine.scope().clone(),
            running: engine.is_running(),
            deployments: engine.infos(),
        })
        .collect();
    scopes.sort_by_key(|s| s.scope.to_string());
    Json(scopes)
}

// ==================== Geofence Handlers ====================

/// Geofences a console should register
pub async fn get_asset_geofences(
    State(state): State<Arc<AppState>>,
    Path(asset_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .geofences
        .get_asset_geofences(&asset_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No geofence adapter for asset {}", asset_id)))
}

/// Feed a batch of location predicates from an evaluation cycle
pub async fn process_location_predicates(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LocationPredicatesRequest>,
) -> impl IntoResponse {
    let unconsumed: Vec<String> = state
        .geofences
        .process_location_predicates(req.changes, req.initialising)
        .into_iter()
        .map(|entry| entry.asset_id)
        .collect();
    Json(serde_json::json!({ "unconsumed": unconsumed }))
}

// ==================== Health Check ====================

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ruleset-hub"
    }))
}
