//! Core domain models for Ruleset Hub
//!
//! This crate contains the shared data structures used across the
//! rules subsystem: Ruleset, Rule, Facts, deployment statuses, assets,
//! location predicates and geofence records, plus the facade traits
//! guest scripts are allowed to call.

pub mod facade;
pub mod models;
pub mod rule;

pub use facade::{
    AssetsFacade, FacadeError, Facades, NotificationsFacade, SandboxViolation, UsersFacade,
};
pub use models::*;
pub use rule::{Action, Condition, Facts, Rule, RuleError, DEFAULT_RULE_PRIORITY};
