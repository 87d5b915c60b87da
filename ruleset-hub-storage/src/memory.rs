//! In-memory storage implementation for development and testing

use async_trait::async_trait;
use parking_lot::RwLock;
use ruleset_hub_core::{
    Asset, AssetQuery, AssetsFacade, FacadeError, Notification, NotificationsFacade,
    PersistenceCause, PersistenceEvent, Ruleset, RulesetScope, User, UserQuery, UsersFacade,
};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{AssetStorage, RulesetStorage, StorageError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory storage for development and testing
///
/// Besides the storage traits it implements the script facades, so a
/// single instance can back both the engine and the guest scripts.
pub struct InMemoryStorage {
    rulesets: RwLock<HashMap<Uuid, Ruleset>>,
    assets: RwLock<HashMap<String, Asset>>,
    users: RwLock<Vec<User>>,
    outbox: RwLock<Vec<Notification>>,
    events: broadcast::Sender<PersistenceEvent>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            rulesets: RwLock::new(HashMap::new()),
            assets: RwLock::new(HashMap::new()),
            users: RwLock::new(Vec::new()),
            outbox: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn add_user(&self, user: User) {
        self.users.write().push(user);
    }

    /// Notifications sent by scripts through the notifications facade
    pub fn sent_notifications(&self) -> Vec<Notification> {
        self.outbox.read().clone()
    }

    fn publish(&self, cause: PersistenceCause, asset: Asset) {
        // No receivers is fine, nobody is listening yet
        let _ = self.events.send(PersistenceEvent { cause, asset });
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RulesetStorage for InMemoryStorage {
    async fn save(&self, ruleset: Ruleset) -> Result<Ruleset, StorageError> {
        let mut rulesets = self.rulesets.write();
        let clash = rulesets.values().any(|existing| {
            existing.scope == ruleset.scope
                && existing.name == ruleset.name
                && existing.version == ruleset.version
                && existing.id != ruleset.id
        });
        if clash {
            return Err(StorageError::VersionConflict {
                scope: ruleset.scope,
                name: ruleset.name,
                version: ruleset.version,
            });
        }
        rulesets.insert(ruleset.id, ruleset.clone());
        Ok(ruleset)
    }

    async fn get_latest(&self, scope: &RulesetScope, name: &str) -> Result<Option<Ruleset>, StorageError> {
        Ok(self
            .rulesets
            .read()
            .values()
            .filter(|r| &r.scope == scope && r.name == name)
            .max_by_key(|r| r.version)
            .cloned())
    }

    async fn list_by_scope(&self, scope: &RulesetScope) -> Result<Vec<Ruleset>, StorageError> {
        let rulesets = self.rulesets.read();
        let mut latest: HashMap<&str, &Ruleset> = HashMap::new();
        for ruleset in rulesets.values().filter(|r| &r.scope == scope) {
            let entry = latest.entry(ruleset.name.as_str()).or_insert(ruleset);
            if ruleset.version > entry.version {
                *entry = ruleset;
            }
        }
        let mut result: Vec<Ruleset> = latest.into_values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn delete(&self, scope: &RulesetScope, name: &str) -> Result<(), StorageError> {
        let mut rulesets = self.rulesets.write();
        let before = rulesets.len();
        rulesets.retain(|_, r| !(&r.scope == scope && r.name == name));
        if rulesets.len() == before {
            return Err(StorageError::RulesetNotFound {
                scope: scope.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStorage for InMemoryStorage {
    async fn find_all(&self, query: &AssetQuery) -> Result<Vec<Asset>, StorageError> {
        let mut assets: Vec<Asset> = self
            .assets
            .read()
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assets)
    }

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>, StorageError> {
        Ok(self.assets.read().get(id).cloned())
    }

    async fn merge(&self, asset: Asset) -> Result<Asset, StorageError> {
        let previous = self.assets.write().insert(asset.id.clone(), asset.clone());
        let cause = if previous.is_some() {
            PersistenceCause::Update
        } else {
            PersistenceCause::Insert
        };
        tracing::debug!(asset_id = %asset.id, ?cause, "Merged asset");
        self.publish(cause, asset.clone());
        Ok(asset)
    }

    async fn delete_asset(&self, id: &str) -> Result<(), StorageError> {
        let removed = self.assets.write().remove(id);
        match removed {
            Some(asset) => {
                tracing::debug!(asset_id = %id, "Deleted asset");
                self.publish(PersistenceCause::Delete, asset);
                Ok(())
            }
            None => Err(StorageError::AssetNotFound(id.to_string())),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.events.subscribe()
    }
}

impl AssetsFacade for InMemoryStorage {
    fn query(&self, query: AssetQuery) -> Result<serde_json::Value, FacadeError> {
        let mut assets: Vec<Asset> = self
            .assets
            .read()
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        serde_json::to_value(assets).map_err(|e| FacadeError::Failed(e.to_string()))
    }

    fn dispatch(&self, asset_id: &str, attribute: &str, value: serde_json::Value) -> Result<(), FacadeError> {
        let updated = {
            let mut assets = self.assets.write();
            let asset = assets
                .get_mut(asset_id)
                .ok_or_else(|| FacadeError::Failed(format!("Asset {} not found", asset_id)))?;
            asset.attributes.insert(attribute.to_string(), value);
            asset.clone()
        };
        self.publish(PersistenceCause::Update, updated);
        Ok(())
    }
}

impl UsersFacade for InMemoryStorage {
    fn query(&self, query: UserQuery) -> Result<Vec<String>, FacadeError> {
        Ok(self
            .users
            .read()
            .iter()
            .filter(|u| query.matches(u))
            .map(|u| u.id.clone())
            .collect())
    }
}

impl NotificationsFacade for InMemoryStorage {
    fn send(&self, notification: Notification) -> Result<(), FacadeError> {
        tracing::info!(name = %notification.name, targets = ?notification.targets.ids, "Queued notification");
        self.outbox.write().push(notification);
        Ok(())
    }
}
