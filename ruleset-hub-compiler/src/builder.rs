//! Builder dialect
//!
//! The script describes rules through chained calls on a `rules` builder:
//!
//! ```text
//! rules.add()
//!     .name("Lights on")
//!     .priority(10)
//!     .when(function (facts) { return facts.dark; })
//!     .then(function (facts) { assets.dispatch("lamp", "on", true); });
//! ```
//!
//! Definitions only accumulate while the script runs; they are validated
//! and registered together once it has finished.

use crate::policy::{AllowList, CapabilityPolicy};
use crate::registry::RulesCompiler;
use crate::script::{self, ScriptLimits};
use crate::CompileError;
use ruleset_hub_core::{Facades, Rule, Ruleset, RulesetLang};
use std::sync::Arc;

const BUILDER_PRELUDE: &str = r#"
var __builder = [];

var rules = {
    add: function () {
        var def = {};
        __builder.push(def);
        var chain = {
            name: function (value) { def.name = value; return chain; },
            description: function (value) { def.description = value; return chain; },
            priority: function (value) { def.priority = value; return chain; },
            when: function (fn) { def.when = fn; return chain; },
            then: function (fn) { def.then = fn; return chain; }
        };
        return chain;
    }
};
"#;

const COLLECT_RULES: &str = "__builder";

/// Compiler for `BUILDER` rulesets
pub struct BuilderCompiler {
    policy: Arc<dyn CapabilityPolicy>,
    limits: ScriptLimits,
}

impl BuilderCompiler {
    pub fn new(policy: Arc<dyn CapabilityPolicy>, limits: ScriptLimits) -> Self {
        Self { policy, limits }
    }
}

impl Default for BuilderCompiler {
    fn default() -> Self {
        Self::new(Arc::new(AllowList::default()), ScriptLimits::default())
    }
}

impl RulesCompiler for BuilderCompiler {
    fn lang(&self) -> RulesetLang {
        RulesetLang::Builder
    }

    fn compile(&self, ruleset: &Ruleset, facades: &Facades) -> Result<Vec<Rule>, CompileError> {
        script::compile(
            ruleset,
            facades,
            self.policy.clone(),
            &self.limits,
            BUILDER_PRELUDE,
            COLLECT_RULES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleField;
    use ruleset_hub_core::{Asset, AssetType, Facts, RulesetScope, DEFAULT_RULE_PRIORITY};
    use ruleset_hub_storage::{AssetStorage, InMemoryStorage};
    use serde_json::json;

    fn ruleset(source: &str) -> Ruleset {
        Ruleset::new("builder", RulesetLang::Builder, RulesetScope::Global, source)
    }

    fn facades(storage: &Arc<InMemoryStorage>) -> Facades {
        Facades::new(storage.clone(), storage.clone(), storage.clone())
    }

    #[tokio::test]
    async fn test_builder_chain() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .merge(Asset::new("lamp", "Lamp", "master", AssetType::Thing))
            .await
            .unwrap();

        let rules = BuilderCompiler::default()
            .compile(
                &ruleset(
                    r#"
                    rules.add()
                        .name("Lights on")
                        .description("Switch the lamp on when it gets dark")
                        .priority(10)
                        .when(function (facts) { return facts.lux < 20; })
                        .then(function (facts) { assets.dispatch("lamp", "on", true); });

                    rules.add()
                        .name("Count")
                        .when(function (facts) { return true; })
                        .then(function (facts) { facts.count = (facts.count || 0) + 1; });
                    "#,
                ),
                &facades(&storage),
            )
            .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), "Lights on");
        assert_eq!(rules[0].priority(), 10);
        assert_eq!(rules[1].priority(), DEFAULT_RULE_PRIORITY);
        assert_eq!(rules[1].description(), None);

        let mut facts = Facts::new(json!({ "lux": 5 }));
        assert!(rules[0].evaluate(&facts).unwrap());
        rules[0].execute(&mut facts).unwrap();
        let lamp = storage.get_asset("lamp").await.unwrap().unwrap();
        assert_eq!(lamp.attributes["on"], json!(true));

        rules[1].execute(&mut facts).unwrap();
        assert_eq!(facts.get("count"), Some(&json!(1)));
    }

    #[test]
    fn test_incomplete_chain_rejected() {
        let storage = Arc::new(InMemoryStorage::new());
        let err = BuilderCompiler::default()
            .compile(
                &ruleset(
                    r#"
                    rules.add().name("complete").when(function () { return true; }).then(function () {});
                    rules.add().name("no-action").when(function () { return true; });
                    "#,
                ),
                &facades(&storage),
            )
            .unwrap_err();

        match err {
            CompileError::Validation(e) => {
                assert_eq!(e.field, RuleField::Then);
                assert_eq!(e.rule.as_deref(), Some("no-action"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_script_yields_no_rules() {
        let storage = Arc::new(InMemoryStorage::new());
        let rules = BuilderCompiler::default()
            .compile(&ruleset("LOG.info('nothing to see');"), &facades(&storage))
            .unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_denied_call_in_builder_script() {
        let storage = Arc::new(InMemoryStorage::new());
        let compiler = BuilderCompiler::new(
            Arc::new(AllowList::empty().allow("assets", "query")),
            ScriptLimits::default(),
        );
        let err = compiler
            .compile(&ruleset("users.query({ realm: 'master' });"), &facades(&storage))
            .unwrap_err();
        assert!(matches!(err, CompileError::Sandbox(v) if v.receiver == "users"));
    }
}
