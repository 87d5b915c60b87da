//! Capability policy consulted on every guest call into the host

use ruleset_hub_core::SandboxViolation;
use std::collections::HashSet;

/// Decides which receiver methods guest scripts may reach
///
/// The host supplies the policy; the script runtime asks it once per call,
/// so a policy may change its answer between calls.
pub trait CapabilityPolicy: Send + Sync {
    fn check(&self, receiver: &str, method: &str) -> Result<(), SandboxViolation>;
}

/// Allow-list policy: anything not listed is denied
#[derive(Debug, Clone)]
pub struct AllowList {
    methods: HashSet<(String, String)>,
    receivers: HashSet<String>,
}

impl AllowList {
    /// Deny everything
    pub fn empty() -> Self {
        Self {
            methods: HashSet::new(),
            receivers: HashSet::new(),
        }
    }

    /// The facade methods rulesets are expected to use
    pub fn facades() -> Self {
        Self::empty()
            .allow("assets", "query")
            .allow("assets", "dispatch")
            .allow("users", "query")
            .allow("notifications", "send")
    }

    pub fn allow(mut self, receiver: &str, method: &str) -> Self {
        self.methods.insert((receiver.to_string(), method.to_string()));
        self
    }

    /// Allow every method of a receiver
    pub fn allow_receiver(mut self, receiver: &str) -> Self {
        self.receivers.insert(receiver.to_string());
        self
    }

    pub fn permits(&self, receiver: &str, method: &str) -> bool {
        self.receivers.contains(receiver)
            || self
                .methods
                .contains(&(receiver.to_string(), method.to_string()))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::facades()
    }
}

impl CapabilityPolicy for AllowList {
    fn check(&self, receiver: &str, method: &str) -> Result<(), SandboxViolation> {
        if self.permits(receiver, method) {
            Ok(())
        } else {
            Err(SandboxViolation::new(receiver, method))
        }
    }
}
