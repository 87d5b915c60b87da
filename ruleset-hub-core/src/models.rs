//! Core domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Guest dialect a ruleset is authored in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RulesetLang {
    /// Script leaves a top-level `rules` array of rule objects
    Javascript,
    /// Script calls `rules.add()...` builder chains
    Builder,
    /// Any tag no compiler is known for
    Unknown(String),
}

impl RulesetLang {
    pub fn as_str(&self) -> &str {
        match self {
            RulesetLang::Javascript => "JAVASCRIPT",
            RulesetLang::Builder => "BUILDER",
            RulesetLang::Unknown(tag) => tag,
        }
    }
}

impl From<String> for RulesetLang {
    fn from(tag: String) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "JAVASCRIPT" => RulesetLang::Javascript,
            "BUILDER" => RulesetLang::Builder,
            _ => RulesetLang::Unknown(tag),
        }
    }
}

impl From<RulesetLang> for String {
    fn from(lang: RulesetLang) -> Self {
        lang.as_str().to_string()
    }
}

impl fmt::Display for RulesetLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation scope of a ruleset; rulesets sharing a scope are gated together
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RulesetScope {
    Global,
    Tenant {
        realm: String,
    },
    #[serde(rename_all = "camelCase")]
    Asset {
        realm: String,
        asset_id: String,
    },
}

impl fmt::Display for RulesetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesetScope::Global => f.write_str("global"),
            RulesetScope::Tenant { realm } => write!(f, "tenant:{}", realm),
            RulesetScope::Asset { realm, asset_id } => write!(f, "asset:{}/{}", realm, asset_id),
        }
    }
}

/// A named, versioned block of rule source text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ruleset {
    /// Unique identifier of this version
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Version number (auto-incremented)
    pub version: u32,
    /// Dialect of `rules`
    pub lang: RulesetLang,
    pub scope: RulesetScope,
    /// Guest script source
    pub rules: String,
    /// When this version was created
    pub created_at: DateTime<Utc>,
}

impl Ruleset {
    pub fn new(name: impl Into<String>, lang: RulesetLang, scope: RulesetScope, rules: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            lang,
            scope,
            rules: rules.into(),
            created_at: Utc::now(),
        }
    }

    /// Create the next version of this ruleset with new source
    pub fn new_version(&self, rules: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            version: self.version + 1,
            lang: self.lang.clone(),
            scope: self.scope.clone(),
            rules: rules.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ruleset{{id={}, name='{}', version={}, lang={}, scope={}}}",
            self.id, self.name, self.version, self.lang, self.scope
        )
    }
}

/// Deployment status of a compiled ruleset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Compiled successfully but held back because a sibling in the same scope failed
    Ready,
    /// Compiled and eligible for execution
    Deployed,
    /// Did not compile and can not be executed
    CompilationError,
    /// Raised during evaluation; terminal until redeploy
    ExecutionError,
}

impl DeploymentStatus {
    pub fn is_error(self) -> bool {
        matches!(self, DeploymentStatus::CompilationError | DeploymentStatus::ExecutionError)
    }

    /// Whether the transition table permits moving from `from` to `to`
    pub fn allows(from: Option<DeploymentStatus>, to: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        match from {
            None => matches!(to, Ready | Deployed | CompilationError),
            Some(Ready) => to == Deployed,
            Some(Deployed) => matches!(to, Ready | ExecutionError),
            Some(CompilationError) | Some(ExecutionError) => false,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Ready => "READY",
            DeploymentStatus::Deployed => "DEPLOYED",
            DeploymentStatus::CompilationError => "COMPILATION_ERROR",
            DeploymentStatus::ExecutionError => "EXECUTION_ERROR",
        };
        f.write_str(s)
    }
}

// ==================== Assets ====================

/// Attribute holding the console provider map
pub const CONSOLE_PROVIDERS_ATTRIBUTE: &str = "consoleProviders";
/// Attribute devices write to when crossing a geofence boundary
pub const LOCATION_ATTRIBUTE: &str = "location";
/// Provider key consoles declare geofence support under
pub const GEOFENCE_PROVIDER: &str = "geofence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Console,
    Thing,
    Building,
    Room,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub realm: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Asset {
    pub fn new(id: impl Into<String>, name: impl Into<String>, realm: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            realm: realm.into(),
            asset_type,
            attributes: serde_json::Map::new(),
        }
    }

    /// Declare a console provider, e.g. `("geofence", "ORConsole")`
    pub fn with_console_provider(mut self, provider: &str, version: &str) -> Self {
        let providers = self
            .attributes
            .entry(CONSOLE_PROVIDERS_ATTRIBUTE)
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let serde_json::Value::Object(map) = providers {
            map.insert(
                provider.to_string(),
                serde_json::json!({ "version": version, "disabled": false }),
            );
        }
        self
    }

    pub fn console_provider(&self, provider: &str) -> Option<ConsoleProvider> {
        let value = self.attributes.get(CONSOLE_PROVIDERS_ATTRIBUTE)?.get(provider)?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// A capability declared by a console asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsoleProvider {
    pub version: String,
    pub requires_permission: bool,
    pub has_permission: bool,
    pub disabled: bool,
    pub data: Option<serde_json::Value>,
}

/// Query accepted by the assets facade and asset storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetQuery {
    pub ids: Option<Vec<String>>,
    pub realm: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    /// Only assets declaring this console provider
    pub console_provider: Option<String>,
}

impl AssetQuery {
    pub fn matches(&self, asset: &Asset) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &asset.id) {
                return false;
            }
        }
        if let Some(realm) = &self.realm {
            if realm != &asset.realm {
                return false;
            }
        }
        if let Some(asset_type) = self.asset_type {
            if asset_type != asset.asset_type {
                return false;
            }
        }
        if let Some(provider) = &self.console_provider {
            if asset.console_provider(provider).is_none() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub realm: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserQuery {
    pub realm: Option<String>,
    pub username: Option<String>,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        self.realm.as_ref().map_or(true, |r| r == &user.realm)
            && self.username.as_ref().map_or(true, |u| u == &user.username)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceCause {
    Insert,
    Update,
    Delete,
}

/// Change notification emitted by asset storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceEvent {
    pub cause: PersistenceCause,
    pub asset: Asset,
}

// ==================== Location predicates ====================

/// Circle expressed as a center point and a radius in meters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadialLocation {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

impl RadialLocation {
    pub fn new(lat: f64, lng: f64, radius: f64) -> Self {
        Self { lat, lng, radius }
    }

    fn bits(&self) -> (u64, u64, u64) {
        (self.lat.to_bits(), self.lng.to_bits(), self.radius.to_bits())
    }
}

impl PartialEq for RadialLocation {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for RadialLocation {}

impl Hash for RadialLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RectangularLocation {
    pub lat_min: f64,
    pub lng_min: f64,
    pub lat_max: f64,
    pub lng_max: f64,
}

/// Location predicate produced by rule evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicateType", rename_all = "camelCase")]
pub enum LocationPredicate {
    Radial(RadialLocation),
    Rect(RectangularLocation),
}

impl LocationPredicate {
    pub fn as_radial(&self) -> Option<&RadialLocation> {
        match self {
            LocationPredicate::Radial(radial) => Some(radial),
            LocationPredicate::Rect(_) => None,
        }
    }
}

/// Location predicates currently matched for one asset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStateLocationPredicates {
    pub asset_id: String,
    pub location_predicates: Vec<LocationPredicate>,
}

impl AssetStateLocationPredicates {
    pub fn new(asset_id: impl Into<String>, location_predicates: Vec<LocationPredicate>) -> Self {
        Self {
            asset_id: asset_id.into(),
            location_predicates,
        }
    }
}

/// Geofence a device registers locally and reports crossings of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceDefinition {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    pub callback_method: String,
    pub callback_url: String,
}

// ==================== Notifications ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushTargetType {
    Device,
    Topic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotificationMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub target_type: PushTargetType,
}

impl PushNotificationMessage {
    /// Silent message carrying only `data`
    pub fn data_only(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            title: None,
            body: None,
            data,
            target_type: PushTargetType::Device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationTargetType {
    Tenant,
    User,
    Asset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTargets {
    pub target_type: NotificationTargetType,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub name: String,
    pub message: PushNotificationMessage,
    pub targets: NotificationTargets,
}

// ==================== API Request Types ====================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRulesetRequest {
    pub name: String,
    pub lang: RulesetLang,
    pub scope: RulesetScope,
    pub rules: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRulesetRequest {
    pub name: String,
    pub scope: RulesetScope,
}

/// Batch of predicate changes produced by one evaluation cycle
#[derive(Debug, Clone, Deserialize)]
pub struct LocationPredicatesRequest {
    pub changes: Vec<AssetStateLocationPredicates>,
    #[serde(default)]
    pub initialising: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lang_tags() {
        assert_eq!(RulesetLang::from("javascript".to_string()), RulesetLang::Javascript);
        assert_eq!(RulesetLang::from("BUILDER".to_string()), RulesetLang::Builder);
        assert_eq!(
            RulesetLang::from("GROOVY".to_string()),
            RulesetLang::Unknown("GROOVY".to_string())
        );

        let json = serde_json::to_string(&RulesetLang::Builder).unwrap();
        assert_eq!(json, "\"BUILDER\"");
    }

    #[test]
    fn test_ruleset_new_version() {
        let v1 = Ruleset::new("lights", RulesetLang::Javascript, RulesetScope::Global, "var rules = [];");
        let v2 = v1.new_version("var rules = [1];");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.name, "lights");
        assert_ne!(v1.id, v2.id);
    }

    #[test]
    fn test_status_transitions() {
        use DeploymentStatus::*;
        assert!(DeploymentStatus::allows(None, Ready));
        assert!(DeploymentStatus::allows(None, CompilationError));
        assert!(!DeploymentStatus::allows(None, ExecutionError));
        assert!(DeploymentStatus::allows(Some(Ready), Deployed));
        assert!(DeploymentStatus::allows(Some(Deployed), ExecutionError));
        assert!(!DeploymentStatus::allows(Some(CompilationError), Deployed));
        assert!(!DeploymentStatus::allows(Some(ExecutionError), Ready));
    }

    #[test]
    fn test_location_predicate_serde() {
        let json = serde_json::json!([
            { "predicateType": "radial", "lat": 51.0, "lng": 4.0, "radius": 100.0 },
            { "predicateType": "rect", "latMin": 1.0, "lngMin": 2.0, "latMax": 3.0, "lngMax": 4.0 }
        ]);
        let predicates: Vec<LocationPredicate> = serde_json::from_value(json).unwrap();
        assert!(predicates[0].as_radial().is_some());
        assert!(predicates[1].as_radial().is_none());
    }

    #[test]
    fn test_radial_set_equality() {
        let a: HashSet<_> = [RadialLocation::new(1.0, 2.0, 50.0), RadialLocation::new(3.0, 4.0, 10.0)]
            .into_iter()
            .collect();
        let b: HashSet<_> = [RadialLocation::new(3.0, 4.0, 10.0), RadialLocation::new(1.0, 2.0, 50.0)]
            .into_iter()
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_console_provider_lookup() {
        let asset = Asset::new("c1", "Phone", "master", AssetType::Console)
            .with_console_provider(GEOFENCE_PROVIDER, "ORConsole");
        let provider = asset.console_provider(GEOFENCE_PROVIDER).unwrap();
        assert_eq!(provider.version, "ORConsole");
        assert!(asset.console_provider("push").is_none());

        let query = AssetQuery {
            asset_type: Some(AssetType::Console),
            console_provider: Some(GEOFENCE_PROVIDER.to_string()),
            ..Default::default()
        };
        assert!(query.matches(&asset));
    }
}
