//! Compiled, status-tracked form of one ruleset version

use crate::DeploymentError;
use ruleset_hub_compiler::CompilerRegistry;
use ruleset_hub_core::{DeploymentStatus, Facades, Rule, RuleError, Ruleset};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// One ruleset version's compiled rules, status and last error
///
/// The error is set exactly when the status is an error state.
pub struct RulesetDeployment {
    ruleset: Ruleset,
    compilers: Arc<CompilerRegistry>,
    rules: Vec<Rule>,
    status: Option<DeploymentStatus>,
    error: Option<DeploymentError>,
}

impl RulesetDeployment {
    pub fn new(ruleset: Ruleset, compilers: Arc<CompilerRegistry>) -> Self {
        Self {
            ruleset,
            compilers,
            rules: Vec::new(),
            status: None,
            error: None,
        }
    }

    /// A new deployment of `ruleset` with its rules already registered
    pub fn compiled(ruleset: Ruleset, compilers: Arc<CompilerRegistry>, facades: &Facades) -> Self {
        let mut deployment = Self::new(ruleset, compilers);
        deployment.register_rules(facades);
        deployment
    }

    pub fn id(&self) -> Uuid {
        self.ruleset.id
    }

    pub fn name(&self) -> &str {
        &self.ruleset.name
    }

    pub fn version(&self) -> u32 {
        self.ruleset.version
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// `None` until the first deploy attempt
    pub fn status(&self) -> Option<DeploymentStatus> {
        self.status
    }

    pub fn error(&self) -> Option<&DeploymentError> {
        self.error.as_ref()
    }

    /// Compile the ruleset with the compiler registered for its language
    ///
    /// On success the compiled rules replace the current ones. On failure
    /// no rule is kept, the error is stored and the deployment enters
    /// `COMPILATION_ERROR`.
    ///
    /// A deployment compiles at most once it has a status; redeploying means
    /// building a new deployment.
    pub fn register_rules(&mut self, facades: &Facades) -> bool {
        if let Some(status) = self.status {
            tracing::warn!(
                ruleset = %self.ruleset.name,
                version = self.ruleset.version,
                %status,
                "Deployment already has a status, not recompiling"
            );
            return false;
        }
        tracing::info!(
            ruleset = %self.ruleset.name,
            version = self.ruleset.version,
            lang = %self.ruleset.lang,
            "Compiling ruleset"
        );

        match self.compilers.compile(&self.ruleset, facades) {
            Ok(rules) => {
                tracing::debug!(
                    ruleset = %self.ruleset.name,
                    version = self.ruleset.version,
                    rules = rules.len(),
                    "Registered rules"
                );
                self.rules = rules;
                true
            }
            Err(e) => {
                let error = DeploymentError::from(e);
                tracing::error!(
                    ruleset = %self.ruleset.name,
                    version = self.ruleset.version,
                    sandbox_violation = error.is_sandbox_violation(),
                    "Error compiling ruleset: {}",
                    error
                );
                self.rules.clear();
                self.fail(DeploymentStatus::CompilationError, error);
                false
            }
        }
    }

    /// Move to `to` if the transition table allows it
    ///
    /// Moving to the current status is a no-op. Error states can only be
    /// entered through compilation or [`Self::fail_execution`].
    pub fn set_status(&mut self, to: DeploymentStatus) -> Result<(), DeploymentError> {
        if self.status == Some(to) {
            return Ok(());
        }
        if to.is_error() || !DeploymentStatus::allows(self.status, to) {
            return Err(DeploymentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        tracing::debug!(ruleset = %self.ruleset.name, from = ?self.status, %to, "Deployment status changed");
        self.status = Some(to);
        Ok(())
    }

    /// Record a rule that raised during live evaluation
    pub fn fail_execution(&mut self, error: RuleError) -> Result<(), DeploymentError> {
        if !DeploymentStatus::allows(self.status, DeploymentStatus::ExecutionError) {
            return Err(DeploymentError::InvalidTransition {
                from: self.status,
                to: DeploymentStatus::ExecutionError,
            });
        }
        let error = DeploymentError::from(error);
        tracing::error!(
            ruleset = %self.ruleset.name,
            version = self.ruleset.version,
            sandbox_violation = error.is_sandbox_violation(),
            "Rule execution failed: {}",
            error
        );
        self.fail(DeploymentStatus::ExecutionError, error);
        Ok(())
    }

    fn fail(&mut self, status: DeploymentStatus, error: DeploymentError) {
        self.status = Some(status);
        self.error = Some(error);
    }

    pub fn info(&self) -> DeploymentInfo {
        DeploymentInfo {
            id: self.ruleset.id,
            name: self.ruleset.name.clone(),
            version: self.ruleset.version,
            status: self.status,
            error: self.error.as_ref().map(ToString::to_string),
            sandbox_violation: self.error.as_ref().is_some_and(DeploymentError::is_sandbox_violation),
            rules: self.rules.len(),
        }
    }
}

impl std::fmt::Debug for RulesetDeployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesetDeployment")
            .field("name", &self.ruleset.name)
            .field("version", &self.ruleset.version)
            .field("status", &self.status)
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Serializable view of a deployment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub status: Option<DeploymentStatus>,
    pub error: Option<String>,
    pub sandbox_violation: bool,
    pub rules: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleset_hub_compiler::{AllowList, ScriptLimits};
    use ruleset_hub_core::{RulesetLang, RulesetScope};
    use ruleset_hub_storage::InMemoryStorage;

    fn facades() -> Facades {
        let storage = Arc::new(InMemoryStorage::new());
        Facades::new(storage.clone(), storage.clone(), storage)
    }

    fn deployment(lang: RulesetLang, source: &str) -> RulesetDeployment {
        let compilers = Arc::new(CompilerRegistry::with_defaults(
            Arc::new(AllowList::default()),
            ScriptLimits::default(),
        ));
        RulesetDeployment::new(
            Ruleset::new("test", lang, RulesetScope::Global, source),
            compilers,
        )
    }

    #[test]
    fn test_register_success_leaves_status_for_gating() {
        let mut deployment = deployment(
            RulesetLang::Javascript,
            "let rules = [{ name: 'a', when: function () { return true; }, then: function () {} }];",
        );
        assert!(deployment.register_rules(&facades()));
        assert_eq!(deployment.rules().len(), 1);
        assert_eq!(deployment.status(), None);
        assert!(deployment.error().is_none());

        deployment.set_status(DeploymentStatus::Deployed).unwrap();
        deployment.set_status(DeploymentStatus::Ready).unwrap();
        deployment.set_status(DeploymentStatus::Deployed).unwrap();
    }

    #[test]
    fn test_compile_failure_sets_error() {
        let mut deployment = deployment(RulesetLang::Javascript, "let rules = [{ name: 'a' }];");
        assert!(!deployment.register_rules(&facades()));
        assert_eq!(deployment.status(), Some(DeploymentStatus::CompilationError));
        assert!(matches!(deployment.error(), Some(DeploymentError::Compile(_))));
        assert!(deployment.rules().is_empty());

        let err = deployment.set_status(DeploymentStatus::Deployed).unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidTransition { .. }));
    }

    #[test]
    fn test_no_recompile_once_status_is_set() {
        let mut failed = deployment(RulesetLang::Javascript, "let rules = [{ name: 'a' }];");
        assert!(!failed.register_rules(&facades()));
        assert!(!failed.register_rules(&facades()));
        assert!(failed.rules().is_empty());
        assert_eq!(failed.status(), Some(DeploymentStatus::CompilationError));

        let mut deployed = RulesetDeployment::compiled(
            Ruleset::new(
                "test",
                RulesetLang::Javascript,
                RulesetScope::Global,
                "let rules = [{ name: 'a', when: function () { return true; }, then: function () {} }];",
            ),
            Arc::new(CompilerRegistry::with_defaults(
                Arc::new(AllowList::default()),
                ScriptLimits::default(),
            )),
            &facades(),
        );
        deployed.set_status(DeploymentStatus::Deployed).unwrap();
        assert!(!deployed.register_rules(&facades()));
        assert_eq!(deployed.rules().len(), 1);
        assert_eq!(deployed.status(), Some(DeploymentStatus::Deployed));
        assert!(deployed.error().is_none());
    }

    #[test]
    fn test_unknown_language_fails_without_compiling() {
        let mut deployment = deployment(RulesetLang::from("FLOW".to_string()), "anything");
        assert!(!deployment.register_rules(&facades()));
        assert!(matches!(
            deployment.error(),
            Some(DeploymentError::Compile(ruleset_hub_compiler::CompileError::UnsupportedLanguage(_)))
        ));
    }

    #[test]
    fn test_execution_error_is_terminal() {
        let mut deployment = deployment(
            RulesetLang::Javascript,
            "let rules = [{ name: 'a', when: function () { return true; }, then: function () {} }];",
        );
        assert!(deployment.register_rules(&facades()));

        // Only a deployed ruleset executes
        let err = RuleError::Runtime("boom".to_string());
        assert!(deployment.fail_execution(err.clone()).is_err());

        deployment.set_status(DeploymentStatus::Deployed).unwrap();
        deployment.fail_execution(err).unwrap();
        assert_eq!(deployment.status(), Some(DeploymentStatus::ExecutionError));
        assert!(deployment.set_status(DeploymentStatus::Ready).is_err());

        let info = deployment.info();
        assert_eq!(info.status, Some(DeploymentStatus::ExecutionError));
        assert!(info.error.is_some());
        assert!(!info.sandbox_violation);
    }
}
