//! Compiler error types

use ruleset_hub_core::SandboxViolation;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("Invalid rule definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Sandbox violation: {0}")]
    Sandbox(#[from] SandboxViolation),

    #[error("Unsupported ruleset language: {0}")]
    UnsupportedLanguage(String),

    #[error("Script runtime error: {0}")]
    Runtime(String),
}

impl From<rquickjs::Error> for CompileError {
    fn from(err: rquickjs::Error) -> Self {
        CompileError::Runtime(err.to_string())
    }
}

/// Field of a rule definition a validation error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    /// The collection of definitions itself
    Rules,
    Name,
    Description,
    Priority,
    When,
    Then,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleField::Rules => "rules",
            RuleField::Name => "name",
            RuleField::Description => "description",
            RuleField::Priority => "priority",
            RuleField::When => "when",
            RuleField::Then => "then",
        };
        f.write_str(s)
    }
}

/// Malformed rule definition
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ValidationError {
    pub field: RuleField,
    /// Name of the offending rule, when it got far enough to have one
    pub rule: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: RuleField, rule: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            field,
            rule: rule.map(str::to_string),
            message: message.into(),
        }
    }
}
