//! Deployment of compiled rulesets
//!
//! A [`RulesetDeployment`] owns one ruleset version's compiled rules and
//! tracks its health through a fixed status table. A [`RulesEngine`] groups
//! the deployments of one scope, gates them together and fires their rules.

pub mod deployment;
pub mod engine;
pub mod error;

pub use deployment::{DeploymentInfo, RulesetDeployment};
pub use engine::{FireReport, RulesEngine};
pub use error::DeploymentError;
