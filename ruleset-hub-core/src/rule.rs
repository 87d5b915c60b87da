//! Compiled rule contract consumed by the rules engine

use crate::facade::SandboxViolation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Priority assigned when a rule definition does not declare one
pub const DEFAULT_RULE_PRIORITY: i32 = 1000;

/// Facts a rule condition inspects and a rule action may modify
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facts(pub serde_json::Value);

impl Facts {
    pub fn new(data: serde_json::Value) -> Self {
        Self(data)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// Raised while evaluating a condition or executing an action
#[derive(Error, Debug, Clone)]
pub enum RuleError {
    #[error("Error evaluating condition of rule '{rule}': {message}")]
    Condition { rule: String, message: String },

    #[error("Error executing action of rule '{rule}': {message}")]
    Action { rule: String, message: String },

    #[error("Rule '{rule}' attempted a denied capability: {violation}")]
    Sandbox {
        rule: String,
        violation: SandboxViolation,
    },

    #[error("Script runtime error: {0}")]
    Runtime(String),
}

pub trait Condition: Send + Sync {
    fn evaluate(&self, facts: &Facts) -> Result<bool, RuleError>;
}

pub trait Action: Send + Sync {
    fn execute(&self, facts: &mut Facts) -> Result<(), RuleError>;
}

impl<F> Condition for F
where
    F: Fn(&Facts) -> Result<bool, RuleError> + Send + Sync,
{
    fn evaluate(&self, facts: &Facts) -> Result<bool, RuleError> {
        self(facts)
    }
}

impl<F> Action for F
where
    F: Fn(&mut Facts) -> Result<(), RuleError> + Send + Sync,
{
    fn execute(&self, facts: &mut Facts) -> Result<(), RuleError> {
        self(facts)
    }
}

/// Immutable executable unit produced by a compiler
#[derive(Clone)]
pub struct Rule {
    name: String,
    description: Option<String>,
    priority: i32,
    condition: Arc<dyn Condition>,
    action: Arc<dyn Action>,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Arc<dyn Condition>, action: Arc<dyn Action>) -> Self {
        Self {
            name: name.into(),
            description: None,
            priority: DEFAULT_RULE_PRIORITY,
            condition,
            action,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn evaluate(&self, facts: &Facts) -> Result<bool, RuleError> {
        self.condition.evaluate(facts)
    }

    pub fn execute(&self, facts: &mut Facts) -> Result<(), RuleError> {
        self.action.execute(facts)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
