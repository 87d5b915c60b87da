//! Geofence adapter for consoles declaring the configured geofence provider

use crate::chain::GeofenceAssetAdapter;
use crate::lock::NamedLock;
use crate::notifier::{refresh_notification, PendingBatch};
use crate::store::GeofenceStore;
use crate::{GeofenceConfig, GeofenceError, PushTransport};
use parking_lot::Mutex;
use ruleset_hub_core::{
    AssetQuery, AssetStateLocationPredicates, AssetType, GeofenceDefinition, LocationPredicate,
    PersistenceCause, PersistenceEvent, GEOFENCE_PROVIDER,
};
use ruleset_hub_storage::AssetStorage;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct AdapterState {
    store: GeofenceStore,
    pending: PendingBatch,
}

struct Inner {
    config: GeofenceConfig,
    state: NamedLock<AdapterState>,
    transport: Arc<dyn PushTransport>,
    runtime: Handle,
}

/// Keeps console geofences in sync with the radial predicates rules produce
///
/// Registry, snapshots and the pending batch live behind one lock that
/// every mutating entry point takes; notifications are sent after it has
/// been released.
pub struct ConsoleGeofenceAdapter {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleGeofenceAdapter {
    /// Must be called from within a tokio runtime, which later runs the flush timers
    pub fn new(config: GeofenceConfig, transport: Arc<dyn PushTransport>) -> Result<Self, GeofenceError> {
        let runtime = Handle::try_current().map_err(|_| GeofenceError::NoRuntime)?;
        let lock_name = format!("ConsoleGeofenceAdapter[{}]", config.provider_name);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: NamedLock::new(lock_name, AdapterState::default()),
                transport,
                runtime,
            }),
            listener: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &GeofenceConfig {
        &self.inner.config
    }

    /// Load the compatible-console registry and follow asset changes from now on
    pub async fn start(&self, storage: &dyn AssetStorage) -> Result<(), GeofenceError> {
        // Subscribe before the query so no change between the two is missed
        let events = storage.subscribe();
        let query = AssetQuery {
            asset_type: Some(AssetType::Console),
            console_provider: Some(GEOFENCE_PROVIDER.to_string()),
            ..AssetQuery::default()
        };
        let provider = self.inner.config.provider_name.as_str();
        let consoles: Vec<_> = storage
            .find_all(&query)
            .await?
            .into_iter()
            .filter(|asset| GeofenceStore::is_linked(asset, provider))
            .collect();

        let registered = self.inner.state.with_lock("start", |state| {
            state.store.load_registry(consoles);
            state.store.registered()
        });
        tracing::info!(provider, consoles = registered, "Geofence adapter started");

        let listener = self.spawn_change_listener(events);
        if let Some(previous) = self.listener.lock().replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    fn spawn_change_listener(&self, mut events: broadcast::Receiver<PersistenceEvent>) -> JoinHandle<()> {
        let inner = self.inner.clone();
        self.inner.runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => inner.process_asset_change(&event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Geofence adapter missed asset changes");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Asset change stream closed");
        })
    }

    /// Stop following asset changes and drop any pending refresh
    pub fn stop(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.inner.state.with_lock("stop", |state| state.pending.cancel());
        tracing::info!(provider = %self.inner.config.provider_name, "Geofence adapter stopped");
    }

    /// Consume the entries of registered consoles and return the others untouched
    pub fn process_location_predicates(
        &self,
        changes: Vec<AssetStateLocationPredicates>,
        initialising: bool,
    ) -> Vec<AssetStateLocationPredicates> {
        self.inner.process_location_predicates(changes, initialising)
    }

    /// Geofences of a console, or `None` when this adapter does not handle the asset
    pub fn get_asset_geofences(&self, asset_id: &str) -> Option<Vec<GeofenceDefinition>> {
        let base = self.inner.config.callback_base_url.as_str();
        self.inner
            .state
            .with_lock("getAssetGeofences", |state| state.store.geofences(asset_id, base))
    }

    pub fn process_asset_change(&self, event: &PersistenceEvent) {
        self.inner.process_asset_change(event)
    }

    /// Consoles waiting for the next refresh push
    pub fn pending_notifications(&self) -> Vec<String> {
        self.inner.state.with_lock("pendingNotifications", |state| state.pending.pending())
    }
}

impl Drop for ConsoleGeofenceAdapter {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

impl GeofenceAssetAdapter for ConsoleGeofenceAdapter {
    fn name(&self) -> &str {
        &self.inner.config.provider_name
    }

    fn process_location_predicates(
        &self,
        changes: Vec<AssetStateLocationPredicates>,
        initialising: bool,
    ) -> Vec<AssetStateLocationPredicates> {
        ConsoleGeofenceAdapter::process_location_predicates(self, changes, initialising)
    }

    fn get_asset_geofences(&self, asset_id: &str) -> Option<Vec<GeofenceDefinition>> {
        ConsoleGeofenceAdapter::get_asset_geofences(self, asset_id)
    }
}

impl Inner {
    fn process_location_predicates(
        self: &Arc<Self>,
        changes: Vec<AssetStateLocationPredicates>,
        initialising: bool,
    ) -> Vec<AssetStateLocationPredicates> {
        self.state.with_lock("processLocationPredicates", |state| {
            let mut unconsumed = Vec::new();
            let mut changed = 0;
            for entry in changes {
                if !state.store.is_registered(&entry.asset_id) {
                    unconsumed.push(entry);
                    continue;
                }
                let radials = entry
                    .location_predicates
                    .iter()
                    .filter_map(LocationPredicate::as_radial)
                    .copied()
                    .collect();
                if state.store.apply(&entry.asset_id, radials) && !initialising {
                    state.pending.add(entry.asset_id);
                    changed += 1;
                }
            }

            if changed > 0 {
                tracing::debug!(changed, initialising, "Console geofences changed");
            }
            self.schedule_flush(&mut state.pending);
            unconsumed
        })
    }

    /// Start the flush timer unless one is already in flight
    fn schedule_flush(self: &Arc<Self>, pending: &mut PendingBatch) {
        if !pending.needs_timer() {
            return;
        }
        let inner = self.clone();
        let debounce = self.config.debounce;
        tracing::debug!(debounce_ms = debounce.as_millis() as u64, "Scheduling geofence refresh");
        pending.set_timer(self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.flush().await;
        }));
    }

    async fn flush(&self) {
        let assets = self.state.with_lock("notifyAssets", |state| state.pending.drain());
        tracing::info!(consoles = assets.len(), "Sending geofence refresh notifications");
        for asset_id in assets {
            if let Err(e) = self.transport.send(refresh_notification(&asset_id)).await {
                tracing::warn!(asset_id = %asset_id, "Failed to send geofence refresh: {}", e);
            }
        }
    }

    fn process_asset_change(&self, event: &PersistenceEvent) {
        let asset = &event.asset;
        let provider = self.config.provider_name.as_str();
        self.state.with_lock("processAssetChange", |state| match event.cause {
            PersistenceCause::Insert | PersistenceCause::Update if GeofenceStore::is_linked(asset, provider) => {
                if !state.store.is_registered(&asset.id) {
                    tracing::debug!(asset_id = %asset.id, "Console linked to geofence adapter");
                }
                state.store.register(asset);
            }
            PersistenceCause::Insert | PersistenceCause::Update | PersistenceCause::Delete => {
                if state.store.deregister(&asset.id) {
                    tracing::debug!(asset_id = %asset.id, cause = ?event.cause, "Console removed from geofence adapter");
                }
                state.pending.remove(&asset.id);
            }
        });
    }
}
