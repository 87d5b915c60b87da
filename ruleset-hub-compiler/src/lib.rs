//! Compiler for guest rulesets
//!
//! This crate turns ruleset source text into executable [`Rule`]s. Two
//! dialects are supported, each a [`RulesCompiler`] strategy looked up by
//! the ruleset's language tag in a [`CompilerRegistry`]:
//!
//! - `JAVASCRIPT`: the script leaves a top-level `rules` array of
//!   `{ name, description, priority, when, then }` objects
//! - `BUILDER`: the script calls `rules.add().name(..).when(..).then(..)`
//!
//! Both run inside a QuickJS context whose only way out is a host bridge
//! gated per call by a [`CapabilityPolicy`].
//!
//! [`Rule`]: ruleset_hub_core::Rule

pub mod builder;
pub mod error;
pub mod javascript;
pub mod policy;
pub mod registry;
mod script;
mod validate;

pub use builder::BuilderCompiler;
pub use error::{CompileError, RuleField, ValidationError};
pub use javascript::JavascriptCompiler;
pub use policy::{AllowList, CapabilityPolicy};
pub use registry::{CompilerRegistry, RulesCompiler};
pub use script::ScriptLimits;
