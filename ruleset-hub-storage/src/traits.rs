//! Storage traits defining the interface for persistence

use async_trait::async_trait;
use ruleset_hub_core::{Asset, AssetQuery, PersistenceEvent, Ruleset, RulesetScope};
use tokio::sync::broadcast;

use crate::StorageError;

/// Trait for ruleset storage operations
#[async_trait]
pub trait RulesetStorage: Send + Sync {
    /// Save a ruleset version
    async fn save(&self, ruleset: Ruleset) -> Result<Ruleset, StorageError>;

    /// Get the latest version of a named ruleset within a scope
    async fn get_latest(&self, scope: &RulesetScope, name: &str) -> Result<Option<Ruleset>, StorageError>;

    /// Latest version of every ruleset in a scope
    async fn list_by_scope(&self, scope: &RulesetScope) -> Result<Vec<Ruleset>, StorageError>;

    /// Delete every version of a named ruleset within a scope
    async fn delete(&self, scope: &RulesetScope, name: &str) -> Result<(), StorageError>;
}

/// Trait for asset storage operations
#[async_trait]
pub trait AssetStorage: Send + Sync {
    async fn find_all(&self, query: &AssetQuery) -> Result<Vec<Asset>, StorageError>;

    async fn get_asset(&self, id: &str) -> Result<Option<Asset>, StorageError>;

    /// Insert or update an asset, publishing a persistence event
    async fn merge(&self, asset: Asset) -> Result<Asset, StorageError>;

    /// Delete an asset, publishing a persistence event
    async fn delete_asset(&self, id: &str) -> Result<(), StorageError>;

    /// Subscribe to asset persistence events
    fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent>;
}
