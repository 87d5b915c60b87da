//! Application state shared across handlers

use crate::{ApiError, ServerConfig};
use ruleset_hub_compiler::{AllowList, CompilerRegistry};
use ruleset_hub_core::{Facades, RulesetScope};
use ruleset_hub_engine::RulesEngine;
use ruleset_hub_geofence::{ConsoleGeofenceAdapter, FacadeTransport, GeofenceAdapters};
use ruleset_hub_storage::{InMemoryStorage, Storage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub facades: Facades,
    pub compilers: Arc<CompilerRegistry>,
    /// One engine per scope, created on first deploy
    pub engines: RwLock<HashMap<RulesetScope, RulesEngine>>,
    pub console_geofences: Arc<ConsoleGeofenceAdapter>,
    pub geofences: GeofenceAdapters,
}

impl AppState {
    /// Wire the rules subsystem and geofence adapter onto in-memory storage
    pub async fn with_storage(storage: Arc<InMemoryStorage>, config: &ServerConfig) -> Result<Self, ApiError> {
        let facades = Facades::new(storage.clone(), storage.clone(), storage.clone());
        let compilers = Arc::new(CompilerRegistry::with_defaults(
            Arc::new(AllowList::default()),
            config.script_limits.clone(),
        ));

        let transport = Arc::new(FacadeTransport::new(storage.clone()));
        let console_geofences = Arc::new(ConsoleGeofenceAdapter::new(config.geofence.clone(), transport)?);
        console_geofences.start(storage.as_ref()).await?;

        let mut geofences = GeofenceAdapters::new();
        geofences.add(console_geofences.clone());

        Ok(Self {
            storage,
            facades,
            compilers,
            engines: RwLock::new(HashMap::new()),
            console_geofences,
            geofences,
        })
    }

    pub fn new_engine(&self, scope: RulesetScope) -> RulesEngine {
        RulesEngine::new(scope, self.compilers.clone(), self.facades.clone())
    }

    pub fn shutdown(&self) {
        self.console_geofences.stop();
    }
}
