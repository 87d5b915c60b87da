//! Storage error types

use ruleset_hub_core::RulesetScope;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Ruleset '{name}' in scope {scope} not found")]
    RulesetNotFound { scope: RulesetScope, name: String },

    #[error("Asset {0} not found")]
    AssetNotFound(String),

    #[error("Ruleset '{name}' version {version} in scope {scope} already exists")]
    VersionConflict {
        scope: RulesetScope,
        name: String,
        version: u32,
    },
}
