//! Ordered set of geofence adapters sharing one predicate stream

use ruleset_hub_core::{AssetStateLocationPredicates, GeofenceDefinition};
use std::sync::Arc;

/// Turns location predicates into device geofences for the assets it handles
pub trait GeofenceAssetAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> i32 {
        0
    }

    /// Consume the entries this adapter handles and return the rest
    fn process_location_predicates(
        &self,
        changes: Vec<AssetStateLocationPredicates>,
        initialising: bool,
    ) -> Vec<AssetStateLocationPredicates>;

    /// `None` when the adapter does not handle the asset
    fn get_asset_geofences(&self, asset_id: &str) -> Option<Vec<GeofenceDefinition>>;
}

/// Hands each batch to the adapters in priority order until it is consumed
#[derive(Default, Clone)]
pub struct GeofenceAdapters {
    adapters: Vec<Arc<dyn GeofenceAssetAdapter>>,
}

impl GeofenceAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, adapter: Arc<dyn GeofenceAssetAdapter>) {
        self.adapters.push(adapter);
        self.adapters.sort_by_key(|a| a.priority());
    }

    /// Returns the entries no adapter handles
    pub fn process_location_predicates(
        &self,
        mut changes: Vec<AssetStateLocationPredicates>,
        initialising: bool,
    ) -> Vec<AssetStateLocationPredicates> {
        for adapter in &self.adapters {
            if changes.is_empty() {
                break;
            }
            changes = adapter.process_location_predicates(changes, initialising);
        }
        if !changes.is_empty() {
            tracing::trace!(unhandled = changes.len(), "Location predicates without a geofence adapter");
        }
        changes
    }

    /// Geofences from the first adapter handling the asset
    pub fn get_asset_geofences(&self, asset_id: &str) -> Option<Vec<GeofenceDefinition>> {
        self.adapters
            .iter()
            .find_map(|adapter| adapter.get_asset_geofences(asset_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        priority: i32,
        handles: &'static str,
    }

    impl GeofenceAssetAdapter for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn process_location_predicates(
            &self,
            changes: Vec<AssetStateLocationPredicates>,
            _initialising: bool,
        ) -> Vec<AssetStateLocationPredicates> {
            changes.into_iter().filter(|c| c.asset_id != self.handles).collect()
        }

        fn get_asset_geofences(&self, asset_id: &str) -> Option<Vec<GeofenceDefinition>> {
            (asset_id == self.handles).then(Vec::new)
        }
    }

    #[test]
    fn test_chain_consumes_in_order() {
        let mut chain = GeofenceAdapters::new();
        chain.add(Arc::new(Fixed { name: "second", priority: 10, handles: "b" }));
        chain.add(Arc::new(Fixed { name: "first", priority: 0, handles: "a" }));

        let rest = chain.process_location_predicates(
            vec![
                AssetStateLocationPredicates::new("a", vec![]),
                AssetStateLocationPredicates::new("b", vec![]),
                AssetStateLocationPredicates::new("c", vec![]),
            ],
            false,
        );
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].asset_id, "c");

        assert_eq!(chain.get_asset_geofences("b"), Some(vec![]));
        assert!(chain.get_asset_geofences("c").is_none());
        assert_eq!(chain.adapters[0].name(), "first");
    }
}
