//! Validation of staged rule definitions
//!
//! The script runtime reports each definition's fields together with their JS types;
//! this module decides whether they form a valid rule.

use crate::error::{RuleField, ValidationError};
use ruleset_hub_core::DEFAULT_RULE_PRIORITY;
use serde::Deserialize;
use std::collections::HashSet;

/// Definitions as reported by `__stage` in the script prelude
#[derive(Debug, Deserialize)]
pub(crate) struct Staged {
    /// `None` when the collected value was not an array
    pub rules: Option<Vec<Option<StagedDefinition>>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StagedDefinition {
    name: StagedField,
    description: StagedField,
    priority: StagedField,
    when: StagedField,
    then: StagedField,
}

#[derive(Debug, Deserialize)]
struct StagedField {
    present: bool,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    value: serde_json::Value,
}

impl StagedField {
    fn is(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

/// A definition that passed validation
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub priority: i32,
}

/// Validate every staged definition; the first failure aborts the batch
pub(crate) fn validate(staged: Staged) -> Result<Vec<RuleDefinition>, ValidationError> {
    let entries = staged.rules.ok_or_else(|| {
        ValidationError::new(RuleField::Rules, None, "No 'rules' array defined in ruleset")
    })?;

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(entries.len());
    for (index, staged_def) in entries.into_iter().enumerate() {
        let staged_def = staged_def.ok_or_else(|| {
            ValidationError::new(
                RuleField::Rules,
                None,
                format!("Rule definition at index {} is not an object", index),
            )
        })?;
        let definition = validate_definition(staged_def)?;
        if !seen.insert(definition.name.clone()) {
            return Err(ValidationError::new(
                RuleField::Name,
                Some(&definition.name),
                format!("Duplicate rule name: {}", definition.name),
            ));
        }
        definitions.push(definition);
    }
    Ok(definitions)
}

fn validate_definition(staged_def: StagedDefinition) -> Result<RuleDefinition, ValidationError> {
    if !staged_def.name.present {
        return Err(ValidationError::new(
            RuleField::Name,
            None,
            "Missing 'name' in rule definition",
        ));
    }
    let name = match staged_def.name.value.as_str() {
        Some(name) if staged_def.name.is("string") => name.to_string(),
        _ => {
            return Err(ValidationError::new(
                RuleField::Name,
                None,
                "Defined 'name' of rule is not a string",
            ))
        }
    };
    if name.trim().is_empty() {
        return Err(ValidationError::new(
            RuleField::Name,
            None,
            "Defined 'name' of rule is empty",
        ));
    }

    let description = if !staged_def.description.present || staged_def.description.is("null") {
        None
    } else if staged_def.description.is("string") {
        staged_def.description.value.as_str().map(str::to_string)
    } else {
        return Err(ValidationError::new(
            RuleField::Description,
            Some(&name),
            format!("Defined 'description' is not a string in rule: {}", name),
        ));
    };

    let priority = if !staged_def.priority.present {
        DEFAULT_RULE_PRIORITY
    } else {
        staged_def
            .priority
            .value
            .as_i64()
            .filter(|_| staged_def.priority.is("integer"))
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| {
                ValidationError::new(
                    RuleField::Priority,
                    Some(&name),
                    format!("Defined 'priority' is not an integer in rule: {}", name),
                )
            })?
    };

    check_function(&staged_def.when, RuleField::When, &name)?;
    check_function(&staged_def.then, RuleField::Then, &name)?;

    Ok(RuleDefinition {
        name,
        description,
        priority,
    })
}

fn check_function(value: &StagedField, field: RuleField, rule: &str) -> Result<(), ValidationError> {
    if !value.present {
        return Err(ValidationError::new(
            field,
            Some(rule),
            format!("Missing '{}' function in rule: {}", field, rule),
        ));
    }
    if !value.is("function") {
        return Err(ValidationError::new(
            field,
            Some(rule),
            format!("Defined '{}' is not a function in rule: {}", field, rule),
        ));
    }
    Ok(())
}
