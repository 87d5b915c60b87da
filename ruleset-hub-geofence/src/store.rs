//! Compatible-console registry and per-asset radial predicate snapshots

use ruleset_hub_core::{
    Asset, AssetType, GeofenceDefinition, RadialLocation, GEOFENCE_PROVIDER, LOCATION_ATTRIBUTE,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// HTTP method of the attribute-write callback
pub(crate) const CALLBACK_METHOD: &str = "PUT";

#[derive(Debug, Default)]
pub(crate) struct GeofenceStore {
    /// Console id to realm
    registry: HashMap<String, String>,
    /// Never holds an empty list
    snapshots: HashMap<String, Vec<RadialLocation>>,
}

impl GeofenceStore {
    /// Whether the console declares a geofence provider handled by `provider_name`
    pub fn is_linked(asset: &Asset, provider_name: &str) -> bool {
        asset.asset_type == AssetType::Console
            && asset
                .console_provider(GEOFENCE_PROVIDER)
                .is_some_and(|provider| provider.version == provider_name)
    }

    pub fn load_registry(&mut self, consoles: impl IntoIterator<Item = Asset>) {
        self.registry = consoles
            .into_iter()
            .map(|asset| (asset.id, asset.realm))
            .collect();
    }

    pub fn is_registered(&self, asset_id: &str) -> bool {
        self.registry.contains_key(asset_id)
    }

    pub fn registered(&self) -> usize {
        self.registry.len()
    }

    pub fn register(&mut self, asset: &Asset) {
        self.registry.insert(asset.id.clone(), asset.realm.clone());
    }

    /// Drop the asset from the registry and its snapshot; returns whether it was registered
    pub fn deregister(&mut self, asset_id: &str) -> bool {
        self.snapshots.remove(asset_id);
        self.registry.remove(asset_id).is_some()
    }

    /// Replace the snapshot of a registered asset; returns whether it differs from the previous one
    pub fn apply(&mut self, asset_id: &str, mut radials: Vec<RadialLocation>) -> bool {
        let mut seen = HashSet::new();
        radials.retain(|radial| seen.insert(*radial));

        let changed = match self.snapshots.get(asset_id) {
            Some(existing) => existing.iter().copied().collect::<HashSet<_>>() != seen,
            None => !radials.is_empty(),
        };

        if radials.is_empty() {
            self.snapshots.remove(asset_id);
        } else {
            self.snapshots.insert(asset_id.to_string(), radials);
        }
        changed
    }

    /// `None` when the asset is not a registered console
    pub fn geofences(&self, asset_id: &str, callback_base_url: &str) -> Option<Vec<GeofenceDefinition>> {
        if !self.is_registered(asset_id) {
            return None;
        }
        let radials = self.snapshots.get(asset_id).map(Vec::as_slice).unwrap_or_default();
        let callback_url = format!(
            "{}/asset/{}/attribute/{}",
            callback_base_url.trim_end_matches('/'),
            asset_id,
            LOCATION_ATTRIBUTE
        );
        Some(
            radials
                .iter()
                .map(|radial| GeofenceDefinition {
                    id: geofence_id(asset_id, radial),
                    lat: radial.lat,
                    lng: radial.lng,
                    radius_meters: radial.radius,
                    callback_method: CALLBACK_METHOD.to_string(),
                    callback_url: callback_url.clone(),
                })
                .collect(),
        )
    }
}

/// Stable across restarts: derived from the asset id and the predicate content only
fn geofence_id(asset_id: &str, radial: &RadialLocation) -> String {
    let content = format!(
        "{}:{:016x}:{:016x}:{:016x}",
        asset_id,
        radial.lat.to_bits(),
        radial.lng.to_bits(),
        radial.radius.to_bits()
    );
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes());
    format!("{}_{}", asset_id, digest.simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(id: &str, provider: &str) -> Asset {
        Asset::new(id, "Phone", "master", AssetType::Console).with_console_provider(GEOFENCE_PROVIDER, provider)
    }

    #[test]
    fn test_linked_requires_matching_provider_version() {
        assert!(GeofenceStore::is_linked(&console("c1", "ORConsole"), "ORConsole"));
        assert!(!GeofenceStore::is_linked(&console("c1", "Other"), "ORConsole"));
        assert!(!GeofenceStore::is_linked(
            &Asset::new("c2", "Phone", "master", AssetType::Console),
            "ORConsole"
        ));
        let thing = Asset::new("t", "Thing", "master", AssetType::Thing)
            .with_console_provider(GEOFENCE_PROVIDER, "ORConsole");
        assert!(!GeofenceStore::is_linked(&thing, "ORConsole"));
    }

    #[test]
    fn test_apply_diffs_as_sets() {
        let mut store = GeofenceStore::default();
        store.register(&console("a", "ORConsole"));
        let p1 = RadialLocation::new(52.0, 4.0, 100.0);
        let p2 = RadialLocation::new(51.0, 5.0, 50.0);

        assert!(store.apply("a", vec![p1, p2]));
        assert!(!store.apply("a", vec![p2, p1]));
        assert!(!store.apply("a", vec![p1, p2, p1]));
        assert!(store.apply("a", vec![p1]));
        assert!(store.apply("a", vec![]));
        assert!(!store.apply("a", vec![]));
        assert!(store.snapshots.is_empty());
    }

    #[test]
    fn test_geofence_records() {
        let mut store = GeofenceStore::default();
        assert!(store.geofences("a", "http://host/api").is_none());

        store.register(&console("a", "ORConsole"));
        assert_eq!(store.geofences("a", "http://host/api"), Some(vec![]));

        store.apply("a", vec![RadialLocation::new(52.0, 4.0, 100.0)]);
        let fences = store.geofences("a", "http://host/api/").unwrap();
        assert_eq!(fences.len(), 1);
        assert!(fences[0].id.starts_with("a_"));
        assert_eq!(fences[0].radius_meters, 100.0);
        assert_eq!(fences[0].callback_method, "PUT");
        assert_eq!(fences[0].callback_url, "http://host/api/asset/a/attribute/location");

        let again = store.geofences("a", "http://host/api").unwrap();
        assert_eq!(fences[0].id, again[0].id);
    }

    #[test]
    fn test_deregister_drops_snapshot() {
        let mut store = GeofenceStore::default();
        store.register(&console("a", "ORConsole"));
        store.apply("a", vec![RadialLocation::new(52.0, 4.0, 100.0)]);
        assert!(store.deregister("a"));
        assert!(!store.deregister("a"));
        assert!(store.geofences("a", "http://host").is_none());
        assert_eq!(store.registered(), 0);
    }
}
