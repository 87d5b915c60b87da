//! Adapter configuration

use std::time::Duration;

/// Provider version consoles declare to be handled by this adapter
pub const DEFAULT_PROVIDER_NAME: &str = "ORConsole";

pub const DEFAULT_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct GeofenceConfig {
    /// Delay between the first pending change and the refresh push
    pub debounce: Duration,
    /// Matched against the version of a console's `geofence` provider
    pub provider_name: String,
    /// Prefix of the attribute-write callback devices report crossings to
    pub callback_base_url: String,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            provider_name: DEFAULT_PROVIDER_NAME.to_string(),
            callback_base_url: "http://localhost:8080/api".to_string(),
        }
    }
}
