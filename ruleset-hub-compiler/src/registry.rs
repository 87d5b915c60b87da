//! Compiler strategies keyed by ruleset language

use crate::builder::BuilderCompiler;
use crate::javascript::JavascriptCompiler;
use crate::policy::CapabilityPolicy;
use crate::script::ScriptLimits;
use crate::CompileError;
use ruleset_hub_core::{Facades, Rule, Ruleset, RulesetLang};
use std::collections::HashMap;
use std::sync::Arc;

/// One guest dialect
pub trait RulesCompiler: Send + Sync {
    /// Language tag this compiler handles
    fn lang(&self) -> RulesetLang;

    /// Compile every rule of the ruleset, or none
    fn compile(&self, ruleset: &Ruleset, facades: &Facades) -> Result<Vec<Rule>, CompileError>;
}

/// Lookup from language tag to compiler
#[derive(Clone, Default)]
pub struct CompilerRegistry {
    compilers: HashMap<RulesetLang, Arc<dyn RulesCompiler>>,
}

impl CompilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with both built-in dialects sharing one policy and set of limits
    pub fn with_defaults(policy: Arc<dyn CapabilityPolicy>, limits: ScriptLimits) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JavascriptCompiler::new(policy.clone(), limits.clone())));
        registry.register(Arc::new(BuilderCompiler::new(policy, limits)));
        registry
    }

    /// Add a compiler, replacing any previous one for the same language
    pub fn register(&mut self, compiler: Arc<dyn RulesCompiler>) {
        self.compilers.insert(compiler.lang(), compiler);
    }

    pub fn get(&self, lang: &RulesetLang) -> Option<Arc<dyn RulesCompiler>> {
        self.compilers.get(lang).cloned()
    }

    /// Compile with the compiler registered for the ruleset's language
    pub fn compile(&self, ruleset: &Ruleset, facades: &Facades) -> Result<Vec<Rule>, CompileError> {
        let compiler = self
            .get(&ruleset.lang)
            .ok_or_else(|| CompileError::UnsupportedLanguage(ruleset.lang.to_string()))?;
        compiler.compile(ruleset, facades)
    }
}

impl std::fmt::Debug for CompilerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerRegistry")
            .field("languages", &self.compilers.keys().collect::<Vec<_>>())
            .finish()
    }
}
