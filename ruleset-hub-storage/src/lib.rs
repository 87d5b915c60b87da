//! Storage layer for Ruleset Hub
//!
//! Defines the persistence contract the rules subsystem reads rulesets
//! and assets through, plus an in-memory backend for development and
//! testing that also serves the script facades.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use traits::{AssetStorage, RulesetStorage};

/// Unified storage trait
#[async_trait::async_trait]
pub trait Storage: RulesetStorage + AssetStorage + Send + Sync {}

#[async_trait::async_trait]
impl<T> Storage for T where T: RulesetStorage + AssetStorage + Send + Sync {}
