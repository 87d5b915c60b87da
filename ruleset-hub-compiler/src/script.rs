//! QuickJS host for guest rulesets
//!
//! A [`ScriptSession`] owns one runtime/context pair per compiled ruleset.
//! Guest code reaches the host through two native functions only:
//! `__host_call` (facades, gated by the capability policy) and `__host_log`.
//! Compiled rules keep the session alive and call back into it through
//! `__invoke`.

use crate::error::CompileError;
use crate::policy::CapabilityPolicy;
use crate::validate::{self, RuleDefinition, Staged};
use parking_lot::Mutex;
use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime};
use ruleset_hub_core::{
    Action, Condition, Facades, Facts, Rule, RuleError, Ruleset, SandboxViolation,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RULES_LOG_TARGET: &str = "ruleset_hub::rules";

/// Runtime shared by every dialect: logging, facades, staging and invocation
const PRELUDE: &str = r#"
var __staged = [];
var __registry = {};

function __str(value) {
    if (value === undefined) return 'undefined';
    if (value === null) return 'null';
    if (typeof value === 'object') {
        try { return JSON.stringify(value); } catch (e) { return String(value); }
    }
    return String(value);
}

function __host(receiver, method, args) {
    var reply = JSON.parse(__host_call(receiver, method, JSON.stringify(args)));
    if (reply.error !== undefined) {
        var error = new Error(reply.error);
        error.name = reply.kind;
        throw error;
    }
    return reply.value;
}

var console = {
    debug: function (message) { __host_log('debug', __str(message)); },
    log: function (message) { __host_log('info', __str(message)); },
    info: function (message) { __host_log('info', __str(message)); },
    warn: function (message) { __host_log('warn', __str(message)); },
    error: function (message) { __host_log('error', __str(message)); }
};
var LOG = console;

var assets = {
    query: function (query) {
        return __host('assets', 'query', [query === undefined ? null : query]);
    },
    dispatch: function (assetId, attribute, value) {
        return __host('assets', 'dispatch', [assetId, attribute, value === undefined ? null : value]);
    }
};

var users = {
    query: function (query) {
        return __host('users', 'query', [query === undefined ? null : query]);
    }
};

var notifications = {
    send: function (notification) {
        return __host('notifications', 'send', [notification]);
    }
};

function __field(def, key) {
    var value = def[key];
    if (value === undefined) return { present: false };
    var type = value === null ? 'null' : typeof value;
    if (type === 'number' && Number.isInteger(value)) type = 'integer';
    return {
        present: true,
        type: type,
        value: (type === 'string' || type === 'integer') ? value : null
    };
}

// Snapshot each definition once so validation and registration see the same values
function __stage(defs) {
    if (!Array.isArray(defs)) {
        __staged = [];
        return JSON.stringify({ rules: null });
    }
    __staged = defs.map(function (def) {
        if (def === null || typeof def !== 'object') return null;
        return {
            name: def.name,
            description: def.description,
            priority: def.priority,
            when: def.when,
            then: def.then
        };
    });
    return JSON.stringify({
        rules: __staged.map(function (def) {
            if (def === null) return null;
            return {
                name: __field(def, 'name'),
                description: __field(def, 'description'),
                priority: __field(def, 'priority'),
                when: __field(def, 'when'),
                then: __field(def, 'then')
            };
        })
    });
}

function __adopt() {
    var registry = {};
    __staged.forEach(function (def) {
        registry[def.name] = { when: def.when, then: def.then };
    });
    __registry = registry;
    __staged = [];
}

function __invoke(name, kind, factsJson) {
    var entry = __registry[name];
    var facts = JSON.parse(factsJson);
    if (kind === 'when') {
        return JSON.stringify({ matched: !!entry.when(facts) });
    }
    entry.then(facts);
    return JSON.stringify({ facts: facts === undefined ? null : facts });
}
"#;

/// Resource limits applied to every script runtime
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    /// Maximum heap in bytes (default: 16MB)
    pub max_memory_bytes: usize,
    /// Maximum native stack in bytes (default: 512KB)
    pub max_stack_bytes: usize,
    /// Wall-clock budget per evaluation or rule call in milliseconds (default: 5000)
    pub timeout_ms: u64,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 16 * 1024 * 1024,
            max_stack_bytes: 512 * 1024,
            timeout_ms: 5000,
        }
    }
}

/// Host side of `__host_call` and `__host_log`
struct HostBridge {
    ruleset: String,
    facades: Facades,
    policy: Arc<dyn CapabilityPolicy>,
    violation: Mutex<Option<SandboxViolation>>,
}

impl HostBridge {
    fn call(&self, receiver: &str, method: &str, args: &str) -> String {
        if let Err(violation) = self.policy.check(receiver, method) {
            tracing::warn!(
                target: RULES_LOG_TARGET,
                ruleset = %self.ruleset,
                receiver,
                method,
                "Denied guest call"
            );
            let reply = serde_json::json!({ "error": violation.to_string(), "kind": "SandboxViolation" });
            self.violation.lock().get_or_insert(violation);
            return reply.to_string();
        }

        let reply = serde_json::from_str::<Vec<serde_json::Value>>(args)
            .map_err(|e| e.to_string())
            .and_then(|args| {
                self.facades
                    .invoke(receiver, method, args)
                    .map_err(|e| e.to_string())
            });
        match reply {
            Ok(value) => serde_json::json!({ "value": value }).to_string(),
            Err(message) => serde_json::json!({ "error": message, "kind": "FacadeError" }).to_string(),
        }
    }

    fn log(&self, level: &str, message: &str) {
        let ruleset = self.ruleset.as_str();
        match level {
            "debug" => tracing::debug!(target: RULES_LOG_TARGET, ruleset, "{}", message),
            "warn" => tracing::warn!(target: RULES_LOG_TARGET, ruleset, "{}", message),
            "error" => tracing::error!(target: RULES_LOG_TARGET, ruleset, "{}", message),
            _ => tracing::info!(target: RULES_LOG_TARGET, ruleset, "{}", message),
        }
    }

    fn take_violation(&self) -> Option<SandboxViolation> {
        self.violation.lock().take()
    }
}

#[derive(Deserialize)]
struct ConditionReply {
    matched: bool,
}

#[derive(Deserialize)]
struct ActionReply {
    facts: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    When,
    Then,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::When => "when",
            Phase::Then => "then",
        }
    }
}

/// One ruleset's isolated script context
pub(crate) struct ScriptSession {
    context: Context,
    _runtime: Runtime,
    deadline: Arc<Mutex<Option<Instant>>>,
    timeout: Duration,
    bridge: Arc<HostBridge>,
}

impl ScriptSession {
    /// Create a runtime, bind the host bridge and evaluate the preludes
    pub fn open(
        ruleset: &Ruleset,
        facades: &Facades,
        policy: Arc<dyn CapabilityPolicy>,
        limits: &ScriptLimits,
        dialect_prelude: &str,
    ) -> Result<Arc<Self>, CompileError> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(limits.max_memory_bytes);
        runtime.set_max_stack_size(limits.max_stack_bytes);

        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let watched = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            matches!(*watched.lock(), Some(at) if Instant::now() >= at)
        })));

        let context = Context::full(&runtime)?;
        let bridge = Arc::new(HostBridge {
            ruleset: format!("{} v{}", ruleset.name, ruleset.version),
            facades: facades.clone(),
            policy,
            violation: Mutex::new(None),
        });

        let session = Arc::new(Self {
            context,
            _runtime: runtime,
            deadline,
            timeout: Duration::from_millis(limits.timeout_ms),
            bridge,
        });
        session.install(dialect_prelude)?;
        Ok(session)
    }

    fn install(&self, dialect_prelude: &str) -> Result<(), CompileError> {
        let call_bridge = self.bridge.clone();
        let log_bridge = self.bridge.clone();
        self.context.with(|ctx| {
            let globals = ctx.globals();
            let host_call = Function::new(
                ctx.clone(),
                move |receiver: String, method: String, args: String| {
                    call_bridge.call(&receiver, &method, &args)
                },
            )?;
            globals.set("__host_call", host_call)?;
            let host_log = Function::new(ctx.clone(), move |level: String, message: String| {
                log_bridge.log(&level, &message)
            })?;
            globals.set("__host_log", host_log)?;

            run(&ctx, PRELUDE).map_err(CompileError::Runtime)?;
            run(&ctx, dialect_prelude).map_err(CompileError::Runtime)
        })
    }

    /// Evaluate the ruleset source in the global scope
    pub fn eval_source(&self, source: &str) -> Result<(), CompileError> {
        let _armed = self.arm();
        let result = self.context.with(|ctx| run(&ctx, source));
        if let Some(violation) = self.bridge.take_violation() {
            return Err(CompileError::Sandbox(violation));
        }
        result.map_err(CompileError::Script)
    }

    /// Snapshot the definitions `collect_expr` evaluates to and validate them
    pub fn stage(&self, collect_expr: &str) -> Result<Vec<RuleDefinition>, CompileError> {
        let _armed = self.arm();
        let script = format!("__stage({})", collect_expr);
        let report: String = self.context.with(|ctx| {
            ctx.eval::<String, _>(script.into_bytes())
                .catch(&ctx)
                .map_err(|e| CompileError::Script(e.to_string()))
        })?;
        if let Some(violation) = self.bridge.take_violation() {
            return Err(CompileError::Sandbox(violation));
        }
        let staged: Staged = serde_json::from_str(&report)
            .map_err(|e| CompileError::Runtime(format!("Unreadable rule definitions: {}", e)))?;
        Ok(validate::validate(staged)?)
    }

    /// Register the staged definitions so their functions can be invoked
    pub fn adopt(self: &Arc<Self>, definitions: Vec<RuleDefinition>) -> Result<Vec<Rule>, CompileError> {
        self.context
            .with(|ctx| run(&ctx, "__adopt();"))
            .map_err(CompileError::Runtime)?;

        Ok(definitions
            .into_iter()
            .map(|definition| {
                let condition = Arc::new(ScriptCondition {
                    session: self.clone(),
                    rule: definition.name.clone(),
                });
                let action = Arc::new(ScriptAction {
                    session: self.clone(),
                    rule: definition.name.clone(),
                });
                Rule::new(definition.name, condition, action)
                    .with_description(definition.description)
                    .with_priority(definition.priority)
            })
            .collect())
    }

    fn invoke(&self, rule: &str, phase: Phase, facts: &Facts) -> Result<String, RuleError> {
        let facts_json =
            serde_json::to_string(facts).map_err(|e| RuleError::Runtime(e.to_string()))?;
        let _armed = self.arm();
        let result = self.context.with(|ctx| {
            let invoke: Function = ctx
                .globals()
                .get("__invoke")
                .map_err(|e| e.to_string())?;
            invoke
                .call::<_, String>((rule.to_string(), phase.as_str().to_string(), facts_json))
                .catch(&ctx)
                .map_err(|e| e.to_string())
        });

        if let Some(violation) = self.bridge.take_violation() {
            return Err(RuleError::Sandbox {
                rule: rule.to_string(),
                violation,
            });
        }
        result.map_err(|message| match phase {
            Phase::When => RuleError::Condition {
                rule: rule.to_string(),
                message,
            },
            Phase::Then => RuleError::Action {
                rule: rule.to_string(),
                message,
            },
        })
    }

    /// Start the wall-clock budget; disarmed when the guard drops
    fn arm(&self) -> DeadlineGuard<'_> {
        *self.deadline.lock() = Some(Instant::now() + self.timeout);
        DeadlineGuard {
            deadline: &self.deadline,
        }
    }
}

struct DeadlineGuard<'a> {
    deadline: &'a Mutex<Option<Instant>>,
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        *self.deadline.lock() = None;
    }
}

/// Evaluate a script, turning a thrown exception into its message
fn run(ctx: &Ctx<'_>, source: &str) -> Result<(), String> {
    ctx.eval::<(), _>(source.as_bytes().to_vec())
        .catch(ctx)
        .map_err(|e| e.to_string())
}

/// Condition backed by a guest `when` function
struct ScriptCondition {
    session: Arc<ScriptSession>,
    rule: String,
}

impl Condition for ScriptCondition {
    fn evaluate(&self, facts: &Facts) -> Result<bool, RuleError> {
        let reply = self.session.invoke(&self.rule, Phase::When, facts)?;
        let reply: ConditionReply =
            serde_json::from_str(&reply).map_err(|e| RuleError::Runtime(e.to_string()))?;
        Ok(reply.matched)
    }
}

/// Action backed by a guest `then` function; facts it modifies are written back
struct ScriptAction {
    session: Arc<ScriptSession>,
    rule: String,
}

impl Action for ScriptAction {
    fn execute(&self, facts: &mut Facts) -> Result<(), RuleError> {
        let reply = self.session.invoke(&self.rule, Phase::Then, facts)?;
        let reply: ActionReply =
            serde_json::from_str(&reply).map_err(|e| RuleError::Runtime(e.to_string()))?;
        *facts = Facts::new(reply.facts);
        Ok(())
    }
}

/// Compile a ruleset: evaluate, stage, validate, then register everything at once
///
/// Nothing is registered unless every definition validates.
pub(crate) fn compile(
    ruleset: &Ruleset,
    facades: &Facades,
    policy: Arc<dyn CapabilityPolicy>,
    limits: &ScriptLimits,
    dialect_prelude: &str,
    collect_expr: &str,
) -> Result<Vec<Rule>, CompileError> {
    let session = ScriptSession::open(ruleset, facades, policy, limits, dialect_prelude)?;
    session.eval_source(&ruleset.rules)?;
    let definitions = session.stage(collect_expr)?;
    session.adopt(definitions)
}
