//! Deployment error types

use ruleset_hub_compiler::CompileError;
use ruleset_hub_core::{DeploymentStatus, RuleError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DeploymentError {
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Execution failed: {0}")]
    Execution(#[from] RuleError),

    #[error("Invalid status transition from {from:?} to {to}")]
    InvalidTransition {
        from: Option<DeploymentStatus>,
        to: DeploymentStatus,
    },
}

impl DeploymentError {
    /// Whether the failure was a denied capability rather than faulty logic
    pub fn is_sandbox_violation(&self) -> bool {
        matches!(
            self,
            DeploymentError::Compile(CompileError::Sandbox(_))
                | DeploymentError::Execution(RuleError::Sandbox { .. })
        )
    }
}
