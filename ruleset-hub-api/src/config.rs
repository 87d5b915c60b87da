//! Environment-driven server configuration

use anyhow::Context;
use ruleset_hub_compiler::ScriptLimits;
use ruleset_hub_geofence::GeofenceConfig;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub geofence: GeofenceConfig,
    pub script_limits: ScriptLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            geofence: GeofenceConfig::default(),
            script_limits: ScriptLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT`, `GEOFENCE_*` and `SCRIPT_*` variables, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&lookup, "PORT")? {
            config.port = port;
        }

        let geofence = &mut config.geofence;
        if let Some(ms) = parse::<u64>(&lookup, "GEOFENCE_DEBOUNCE_MS")? {
            geofence.debounce = Duration::from_millis(ms);
        }
        if let Some(name) = lookup("GEOFENCE_PROVIDER_NAME") {
            geofence.provider_name = name;
        }
        geofence.callback_base_url = lookup("GEOFENCE_CALLBACK_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}/api", config.host, config.port));

        let limits = &mut config.script_limits;
        if let Some(bytes) = parse(&lookup, "SCRIPT_MEMORY_LIMIT_BYTES")? {
            limits.max_memory_bytes = bytes;
        }
        if let Some(ms) = parse(&lookup, "SCRIPT_TIMEOUT_MS")? {
            limits.timeout_ms = ms;
        }

        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| value.parse::<T>().with_context(|| format!("{} must be a valid number, got '{}'", key, value)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.geofence.debounce, Duration::from_millis(60_000));
        assert_eq!(config.geofence.provider_name, "ORConsole");
        assert_eq!(config.geofence.callback_base_url, "http://127.0.0.1:8080/api");
        assert_eq!(config.script_limits.timeout_ms, 5000);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("GEOFENCE_DEBOUNCE_MS", "250"),
            ("GEOFENCE_PROVIDER_NAME", "Custom"),
            ("GEOFENCE_CALLBACK_BASE_URL", "https://hub.example/api"),
            ("SCRIPT_MEMORY_LIMIT_BYTES", "1048576"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.geofence.debounce, Duration::from_millis(250));
        assert_eq!(config.geofence.provider_name, "Custom");
        assert_eq!(config.geofence.callback_base_url, "https://hub.example/api");
        assert_eq!(config.script_limits.max_memory_bytes, 1_048_576);
    }

    #[test]
    fn test_invalid_number() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
