//! Function-array dialect
//!
//! The script leaves a top-level `rules` array; every element is an object
//! literal carrying the rule's fields and its `when`/`then` functions.

use crate::policy::{AllowList, CapabilityPolicy};
use crate::registry::RulesCompiler;
use crate::script::{self, ScriptLimits};
use crate::CompileError;
use ruleset_hub_core::{Facades, Rule, Ruleset, RulesetLang};
use std::sync::Arc;

const COLLECT_RULES: &str = "typeof rules === 'undefined' ? undefined : rules";

/// Compiler for `JAVASCRIPT` rulesets
pub struct JavascriptCompiler {
    policy: Arc<dyn CapabilityPolicy>,
    limits: ScriptLimits,
}

impl JavascriptCompiler {
    pub fn new(policy: Arc<dyn CapabilityPolicy>, limits: ScriptLimits) -> Self {
        Self { policy, limits }
    }
}

impl Default for JavascriptCompiler {
    fn default() -> Self {
        Self::new(Arc::new(AllowList::default()), ScriptLimits::default())
    }
}

impl RulesCompiler for JavascriptCompiler {
    fn lang(&self) -> RulesetLang {
        RulesetLang::Javascript
    }

    fn compile(&self, ruleset: &Ruleset, facades: &Facades) -> Result<Vec<Rule>, CompileError> {
        script::compile(ruleset, facades, self.policy.clone(), &self.limits, "", COLLECT_RULES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleField;
    use rstest::rstest;
    use ruleset_hub_core::{Facts, RulesetScope, DEFAULT_RULE_PRIORITY};
    use ruleset_hub_storage::InMemoryStorage;
    use serde_json::json;

    fn facades() -> Facades {
        let storage = Arc::new(InMemoryStorage::new());
        Facades::new(storage.clone(), storage.clone(), storage)
    }

    fn compile(source: &str) -> Result<Vec<Rule>, CompileError> {
        let ruleset = Ruleset::new("test", RulesetLang::Javascript, RulesetScope::Global, source);
        JavascriptCompiler::default().compile(&ruleset, &facades())
    }

    #[test]
    fn test_compile_rules_array() {
        let rules = compile(
            r#"
            let rules = [
                {
                    name: "discount",
                    description: "Apply a discount to large orders",
                    priority: 5,
                    when: function (facts) { return facts.total > 100; },
                    then: function (facts) { facts.discount = 0.1; }
                },
                {
                    name: "log",
                    when: function (facts) { return true; },
                    then: function (facts) { console.log(facts); }
                }
            ];
            "#,
        )
        .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), "discount");
        assert_eq!(rules[0].description(), Some("Apply a discount to large orders"));
        assert_eq!(rules[0].priority(), 5);
        assert_eq!(rules[1].description(), None);
        assert_eq!(rules[1].priority(), DEFAULT_RULE_PRIORITY);

        let mut facts = Facts::new(json!({ "total": 150 }));
        assert!(rules[0].evaluate(&facts).unwrap());
        rules[0].execute(&mut facts).unwrap();
        assert_eq!(facts.get("discount"), Some(&json!(0.1)));

        let small = Facts::new(json!({ "total": 50 }));
        assert!(!rules[0].evaluate(&small).unwrap());
    }

    #[rstest]
    #[case::missing_name("{ when: function () { return true; }, then: function () {} }", RuleField::Name)]
    #[case::name_not_string("{ name: 7, when: function () { return true; }, then: function () {} }", RuleField::Name)]
    #[case::missing_when("{ name: 'a', then: function () {} }", RuleField::When)]
    #[case::when_not_function("{ name: 'a', when: true, then: function () {} }", RuleField::When)]
    #[case::missing_then("{ name: 'a', when: function () { return true; } }", RuleField::Then)]
    #[case::priority_string("{ name: 'a', priority: 'high', when: function () { return true; }, then: function () {} }", RuleField::Priority)]
    #[case::priority_fraction("{ name: 'a', priority: 1.5, when: function () { return true; }, then: function () {} }", RuleField::Priority)]
    #[case::description_number("{ name: 'a', description: 3, when: function () { return true; }, then: function () {} }", RuleField::Description)]
    fn test_invalid_definition(#[case] definition: &str, #[case] field: RuleField) {
        let err = compile(&format!("let rules = [{}];", definition)).unwrap_err();
        match err {
            CompileError::Validation(e) => assert_eq!(e.field, field),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_rules_array() {
        let err = compile("var other = 1;").unwrap_err();
        assert!(matches!(err, CompileError::Validation(e) if e.field == RuleField::Rules));
    }

    #[test]
    fn test_syntax_error() {
        let err = compile("let rules = [ {").unwrap_err();
        assert!(matches!(err, CompileError::Script(_)));
    }

    #[test]
    fn test_late_failure_registers_nothing() {
        let err = compile(
            r#"
            let rules = [
                { name: "ok", when: function () { return true; }, then: function () {} },
                { name: "broken", when: function () { return true; } }
            ];
            "#,
        )
        .unwrap_err();
        match err {
            CompileError::Validation(e) => assert_eq!(e.rule.as_deref(), Some("broken")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_denied_call_during_compile() {
        let ruleset = Ruleset::new(
            "test",
            RulesetLang::Javascript,
            RulesetScope::Global,
            "assets.query({}); let rules = [];",
        );
        let compiler = JavascriptCompiler::new(Arc::new(AllowList::empty()), ScriptLimits::default());
        let err = compiler.compile(&ruleset, &facades()).unwrap_err();
        match err {
            CompileError::Sandbox(violation) => {
                assert_eq!(violation.receiver, "assets");
                assert_eq!(violation.method, "query");
            }
            other => panic!("Expected sandbox violation, got {:?}", other),
        }
    }

    #[test]
    fn test_swallowed_denial_still_reported() {
        let ruleset = Ruleset::new(
            "test",
            RulesetLang::Javascript,
            RulesetScope::Global,
            r#"
            let rules = [{
                name: "sneaky",
                when: function () {
                    try { users.query({}); } catch (e) {}
                    return true;
                },
                then: function () {}
            }];
            "#,
        );
        let compiler = JavascriptCompiler::new(
            Arc::new(AllowList::empty().allow("assets", "query")),
            ScriptLimits::default(),
        );
        let rules = compiler.compile(&ruleset, &facades()).unwrap();
        let err = rules[0].evaluate(&Facts::default()).unwrap_err();
        assert!(matches!(err, ruleset_hub_core::RuleError::Sandbox { .. }));
    }

    #[test]
    fn test_facades_reachable_from_actions() {
        let storage = Arc::new(InMemoryStorage::new());
        let facades = Facades::new(storage.clone(), storage.clone(), storage.clone());
        let ruleset = Ruleset::new(
            "notify",
            RulesetLang::Javascript,
            RulesetScope::Global,
            r#"
            let rules = [{
                name: "alert",
                when: function (facts) { return facts.alarm === true; },
                then: function (facts) {
                    notifications.send({
                        name: "alarm",
                        message: { title: "Alarm", body: null, data: {}, targetType: "DEVICE" },
                        targets: { targetType: "ASSET", ids: ["c1"] }
                    });
                }
            }];
            "#,
        );
        let rules = JavascriptCompiler::default().compile(&ruleset, &facades).unwrap();

        let mut facts = Facts::new(json!({ "alarm": true }));
        assert!(rules[0].evaluate(&facts).unwrap());
        rules[0].execute(&mut facts).unwrap();

        let sent = storage.sent_notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].targets.ids, vec!["c1".to_string()]);
    }

    #[test]
    fn test_throwing_action() {
        let rules = compile(
            r#"
            let rules = [{
                name: "boom",
                when: function () { return true; },
                then: function () { throw new Error("kaput"); }
            }];
            "#,
        )
        .unwrap();
        let err = rules[0].execute(&mut Facts::default()).unwrap_err();
        match err {
            ruleset_hub_core::RuleError::Action { rule, message } => {
                assert_eq!(rule, "boom");
                assert!(message.contains("kaput"));
            }
            other => panic!("Expected action error, got {:?}", other),
        }
    }

    #[test]
    fn test_runaway_script_interrupted() {
        let ruleset = Ruleset::new(
            "spin",
            RulesetLang::Javascript,
            RulesetScope::Global,
            "while (true) {} let rules = [];",
        );
        let limits = ScriptLimits {
            timeout_ms: 50,
            ..ScriptLimits::default()
        };
        let compiler = JavascriptCompiler::new(Arc::new(AllowList::default()), limits);
        let err = compiler.compile(&ruleset, &facades()).unwrap_err();
        assert!(matches!(err, CompileError::Script(_)));
    }
}
