//! Scope engine: gating and firing of the deployments sharing one scope

use crate::deployment::{DeploymentInfo, RulesetDeployment};
use ruleset_hub_compiler::CompilerRegistry;
use ruleset_hub_core::{DeploymentStatus, Facades, Facts, Rule, RuleError, Ruleset, RulesetScope};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one firing cycle
#[derive(Debug, Default)]
pub struct FireReport {
    /// Rules whose action ran, in firing order
    pub fired: Vec<String>,
    /// Deployment and error of the rule that stopped the cycle
    pub failure: Option<(String, RuleError)>,
}

/// Deployments of one scope, keyed by ruleset name
pub struct RulesEngine {
    scope: RulesetScope,
    compilers: Arc<CompilerRegistry>,
    facades: Facades,
    deployments: BTreeMap<String, RulesetDeployment>,
}

impl RulesEngine {
    pub fn new(scope: RulesetScope, compilers: Arc<CompilerRegistry>, facades: Facades) -> Self {
        Self {
            scope,
            compilers,
            facades,
            deployments: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> &RulesetScope {
        &self.scope
    }

    /// Replace every deployment with fresh ones for `rulesets`
    pub fn deploy_all(&mut self, rulesets: Vec<Ruleset>) {
        self.deployments.clear();
        for ruleset in rulesets {
            if !self.accepts(&ruleset) {
                continue;
            }
            let deployment = RulesetDeployment::compiled(ruleset, self.compilers.clone(), &self.facades);
            self.deployments.insert(deployment.name().to_string(), deployment);
        }
        self.apply_gating();
    }

    /// Deploy a new version of one ruleset, replacing the previous deployment
    pub fn upsert_ruleset(&mut self, ruleset: Ruleset) -> Option<&RulesetDeployment> {
        if !self.accepts(&ruleset) {
            return None;
        }
        let deployment = RulesetDeployment::compiled(ruleset, self.compilers.clone(), &self.facades);
        self.install(deployment)
    }

    /// Take over a deployment compiled elsewhere and re-gate the scope
    ///
    /// A deployment older than the one already installed under the same
    /// name is refused.
    pub fn install(&mut self, deployment: RulesetDeployment) -> Option<&RulesetDeployment> {
        if !self.accepts(deployment.ruleset()) {
            return None;
        }
        let name = deployment.name().to_string();
        if let Some(current) = self.deployments.get(&name) {
            if current.version() > deployment.version() {
                tracing::warn!(
                    scope = %self.scope,
                    ruleset = %name,
                    installed = current.version(),
                    offered = deployment.version(),
                    "Ignoring outdated ruleset deployment"
                );
                return None;
            }
        }
        self.deployments.insert(name.clone(), deployment);
        self.apply_gating();
        self.deployments.get(&name)
    }

    pub fn remove_ruleset(&mut self, name: &str) -> Option<RulesetDeployment> {
        let removed = self.deployments.remove(name);
        if removed.is_some() {
            tracing::info!(scope = %self.scope, ruleset = name, "Removed ruleset deployment");
            self.apply_gating();
        }
        removed
    }

    fn accepts(&self, ruleset: &Ruleset) -> bool {
        if ruleset.scope != self.scope {
            tracing::warn!(
                scope = %self.scope,
                ruleset = %ruleset.name,
                ruleset_scope = %ruleset.scope,
                "Ignoring ruleset of another scope"
            );
            return false;
        }
        true
    }

    /// Deploy every compiled ruleset if none in the scope failed, else hold them all in `READY`
    pub fn apply_gating(&mut self) {
        let healthy = !self
            .deployments
            .values()
            .any(|d| d.status().is_some_and(DeploymentStatus::is_error));
        let target = if healthy {
            DeploymentStatus::Deployed
        } else {
            DeploymentStatus::Ready
        };

        for deployment in self.deployments.values_mut() {
            if deployment.status().is_some_and(DeploymentStatus::is_error) {
                continue;
            }
            if let Err(e) = deployment.set_status(target) {
                tracing::warn!(ruleset = %deployment.name(), "Gating skipped deployment: {}", e);
            }
        }

        if !healthy {
            tracing::warn!(scope = %self.scope, "Scope has failed rulesets, holding the others in READY");
        }
    }

    /// Whether every deployment of the scope is running
    pub fn is_running(&self) -> bool {
        !self.deployments.is_empty()
            && self
                .deployments
                .values()
                .all(|d| d.status() == Some(DeploymentStatus::Deployed))
    }

    pub fn deployment(&self, name: &str) -> Option<&RulesetDeployment> {
        self.deployments.get(name)
    }

    pub fn deployments(&self) -> impl Iterator<Item = &RulesetDeployment> {
        self.deployments.values()
    }

    pub fn infos(&self) -> Vec<DeploymentInfo> {
        self.deployments.values().map(RulesetDeployment::info).collect()
    }

    /// Evaluate the rules of deployed rulesets ordered by priority, then name
    ///
    /// A rule raising in its condition or action moves its deployment to
    /// `EXECUTION_ERROR` and ends the cycle; gating then holds the rest of
    /// the scope in `READY`.
    pub fn fire(&mut self, facts: &mut Facts) -> FireReport {
        let mut agenda: Vec<(&str, &Rule)> = self
            .deployments
            .values()
            .filter(|d| d.status() == Some(DeploymentStatus::Deployed))
            .flat_map(|d| d.rules().iter().map(move |rule| (d.name(), rule)))
            .collect();
        agenda.sort_by(|(_, a), (_, b)| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });

        let mut report = FireReport::default();
        for (deployment, rule) in agenda {
            let outcome = rule.evaluate(facts).and_then(|matched| {
                if matched {
                    tracing::trace!(rule = rule.name(), "Firing rule");
                    rule.execute(facts).map(|_| true)
                } else {
                    Ok(false)
                }
            });
            match outcome {
                Ok(true) => report.fired.push(rule.name().to_string()),
                Ok(false) => {}
                Err(e) => {
                    report.failure = Some((deployment.to_string(), e));
                    break;
                }
            }
        }

        if let Some((name, error)) = &report.failure {
            if let Some(deployment) = self.deployments.get_mut(name) {
                if let Err(e) = deployment.fail_execution(error.clone()) {
                    tracing::warn!(ruleset = %name, "Could not record execution error: {}", e);
                }
            }
            self.apply_gating();
        }

        tracing::debug!(scope = %self.scope, fired = report.fired.len(), "Rules fired");
        report
    }
}

impl std::fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine")
            .field("scope", &self.scope)
            .field("deployments", &self.deployments.len())
            .finish()
    }
}
