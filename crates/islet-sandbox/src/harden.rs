//! Ordered lockdown of a worker's runtime environment.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::env::EnvFacade;
use crate::error::{SandboxError, SandboxResult};
use crate::ops::RuntimeOps;
use crate::registry::{BuiltinRegistry, TypeRegistry};
use crate::scope::Scope;

/// Global names that permit dynamic evaluation and are locked against
/// binding during the globals pass.
const DYNAMIC_EVAL_NAMES: &[&str] = &["eval", "Fn"];

/// Which lockdown modules to run. All default to true.
#[derive(Debug, Clone, Copy)]
pub struct HardenOptions {
    /// Freeze registered API types and their prototype sides.
    pub prototypes: bool,
    /// Lock the builtin namespace registry and freeze its objects.
    pub builtins: bool,
    /// Seal the global scope and lock dynamic-evaluation names.
    pub globals: bool,
    /// Freeze the env facade and deny dangerous runtime operations.
    pub runtime: bool,
    /// Re-verify every descriptor after locking.
    pub verify: bool,
    /// Fail the whole call if any operation fails.
    pub strict: bool,
}

impl Default for HardenOptions {
    fn default() -> Self {
        Self {
            prototypes: true,
            builtins: true,
            globals: true,
            runtime: true,
            verify: true,
            strict: false,
        }
    }
}

impl HardenOptions {
    /// Options with `strict` set.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

/// Outcome of one lockdown module.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ModuleReport {
    /// Descriptor operations performed (or checks run, for verification).
    pub operations: usize,
    /// Operations that could not be completed.
    pub failures: usize,
    /// Human-readable notes on the failures.
    pub details: Vec<String>,
}

impl ModuleReport {
    fn note(&mut self, detail: impl Into<String>) {
        self.failures = self.failures.saturating_add(1);
        self.details.push(detail.into());
    }
}

/// Outcome of a [`harden`] or [`verify`] call.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Report {
    /// Whether every module completed without failures.
    pub success: bool,
    /// Per-module outcomes, keyed by module name.
    pub modules: BTreeMap<String, ModuleReport>,
}

impl Report {
    /// Total failed operations across all modules.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.modules.values().map(|m| m.failures).sum()
    }

    fn finish(mut self) -> Self {
        self.success = self.failures() == 0;
        self
    }
}

/// Everything the worker locks down before user code runs.
#[derive(Debug, Default)]
pub struct RuntimeEnv<V> {
    /// Builtin namespaces installed on the global environment.
    pub builtins: BuiltinRegistry,
    /// API types registered on the engine.
    pub types: TypeRegistry,
    /// The env facade snippet code reads from.
    pub env: EnvFacade,
    /// Dangerous-operation policy.
    pub ops: RuntimeOps,
    /// The global scope.
    pub scope: Scope<V>,
}

impl<V> RuntimeEnv<V> {
    /// An empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builtins: BuiltinRegistry::new(),
            types: TypeRegistry::new(),
            env: EnvFacade::new(),
            ops: RuntimeOps::new(),
            scope: Scope::new(),
        }
    }
}

/// Lock down `env` in fixed order: builtins, prototypes, runtime, globals.
///
/// The registries are locked before anything is frozen so later freezes
/// cannot be redefined. Non-strict calls record failures and continue;
/// strict calls fail on the first module pass that reports one.
///
/// # Errors
///
/// Returns [`SandboxError::Strict`] when `options.strict` is set and any
/// operation failed.
pub fn harden<V>(env: &mut RuntimeEnv<V>, options: &HardenOptions) -> SandboxResult<Report> {
    let mut report = Report::default();

    if options.builtins {
        let (operations, failures) = env.builtins.freeze_all();
        let mut module = ModuleReport {
            operations,
            ..ModuleReport::default()
        };
        for _ in 0..failures {
            module.note("priority builtin missing from registry");
        }
        report.modules.insert("builtins".to_string(), module);
    }

    if options.prototypes {
        let module = ModuleReport {
            operations: env.types.freeze_all(),
            ..ModuleReport::default()
        };
        report.modules.insert("prototypes".to_string(), module);
    }

    if options.runtime {
        env.env.freeze();
        let mut module = ModuleReport {
            operations: 1_usize.saturating_add(env.ops.lock_dangerous()),
            ..ModuleReport::default()
        };
        if !env.ops.all_denied() {
            module.note("runtime operations remain allowed after lockdown");
        }
        report.modules.insert("runtime".to_string(), module);
    }

    if options.globals {
        let mut module = ModuleReport {
            operations: env.scope.seal_all(),
            ..ModuleReport::default()
        };
        for name in DYNAMIC_EVAL_NAMES {
            if env.scope.contains(name) {
                module.note(format!("dynamic evaluation binding present: {name}"));
            }
            env.scope.lock_name(*name);
            module.operations = module.operations.saturating_add(1);
        }
        report.modules.insert("globals".to_string(), module);
    }

    if options.verify {
        let verification = verify(env);
        for (name, module) in verification.modules {
            report
                .modules
                .entry(format!("verify:{name}"))
                .or_insert(module);
        }
    }

    let report = report.finish();
    if report.success {
        debug!(
            modules = report.modules.len(),
            "runtime environment hardened"
        );
    } else {
        warn!(failures = report.failures(), "hardening reported failures");
        if options.strict {
            return Err(SandboxError::Strict {
                failures: report.failures(),
            });
        }
    }
    Ok(report)
}

/// Re-check every descriptor in `env` without mutating anything.
#[must_use]
pub fn verify<V>(env: &RuntimeEnv<V>) -> Report {
    let mut report = Report::default();

    let mut builtins = ModuleReport {
        operations: 1,
        ..ModuleReport::default()
    };
    if !env.builtins.is_locked() {
        builtins.note("builtin registry is unlocked");
    }
    for (name, object) in env.builtins.iter() {
        builtins.operations = builtins.operations.saturating_add(1);
        if !object.is_frozen() {
            builtins.note(format!("builtin not frozen: {name}"));
        }
    }
    report.modules.insert("builtins".to_string(), builtins);

    let mut prototypes = ModuleReport {
        operations: 1,
        ..ModuleReport::default()
    };
    if !env.types.is_locked() {
        prototypes.note("type registry is unlocked");
    }
    for (name, shape) in env.types.iter() {
        prototypes.operations = prototypes.operations.saturating_add(1);
        if !shape.is_frozen() {
            prototypes.note(format!("type not frozen: {name}"));
        }
    }
    report.modules.insert("prototypes".to_string(), prototypes);

    let mut runtime = ModuleReport {
        operations: 2,
        ..ModuleReport::default()
    };
    if !env.env.is_frozen() {
        runtime.note("env facade is mutable");
    }
    if !env.ops.is_frozen() || !env.ops.all_denied() {
        runtime.note("runtime operations are not fully denied");
    }
    report.modules.insert("runtime".to_string(), runtime);

    let mut globals = ModuleReport::default();
    for (name, slot) in env.scope.iter() {
        globals.operations = globals.operations.saturating_add(1);
        if slot.writable || slot.configurable {
            globals.note(format!("global is not sealed: {name}"));
        }
    }
    for name in DYNAMIC_EVAL_NAMES {
        globals.operations = globals.operations.saturating_add(1);
        if !env.scope.is_locked(name) {
            globals.note(format!("dynamic evaluation name unlocked: {name}"));
        }
    }
    report.modules.insert("globals".to_string(), globals);

    report.finish()
}

/// List observable tampering in `env`, empty when fully hardened.
#[must_use]
pub fn detect<V>(env: &RuntimeEnv<V>) -> Vec<String> {
    verify(env)
        .modules
        .into_values()
        .flat_map(|module| module.details)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BuiltinObject, TypeShape};

    fn populated_env() -> RuntimeEnv<i64> {
        let mut env = RuntimeEnv::new();
        env.builtins = BuiltinRegistry::with_priority(vec!["console"]);
        env.builtins
            .register("console", BuiltinObject::with_properties(vec!["log"]))
            .unwrap();
        env.types
            .register("CryptoApi", TypeShape::with_methods(vec!["random_uuid"]))
            .unwrap();
        env.env.set("PUBLIC_URL", "https://x").unwrap();
        env.scope.define("console", 0, true, true).unwrap();
        env
    }

    #[test]
    fn harden_locks_everything_and_detect_is_empty() {
        let mut env = populated_env();
        let report = harden(&mut env, &HardenOptions::default()).unwrap();
        assert!(report.success, "details: {:?}", report.modules);

        assert!(env.builtins.is_locked());
        assert!(env.types.is_locked());
        assert!(env.env.is_frozen());
        assert!(env.ops.all_denied());
        assert!(env.scope.is_sealed());
        assert!(env.scope.is_locked("eval"));

        assert!(detect(&env).is_empty());
        assert!(verify(&env).success);
    }

    #[test]
    fn strict_mode_fails_on_any_failure() {
        let mut env: RuntimeEnv<i64> = RuntimeEnv::new();
        env.builtins = BuiltinRegistry::with_priority(vec!["missing"]);
        let err = harden(&mut env, &HardenOptions::strict());
        assert!(matches!(err, Err(SandboxError::Strict { failures }) if failures > 0));
    }

    #[test]
    fn non_strict_mode_records_and_continues() {
        let mut env: RuntimeEnv<i64> = RuntimeEnv::new();
        env.builtins = BuiltinRegistry::with_priority(vec!["missing"]);
        let report = harden(&mut env, &HardenOptions::default()).unwrap();
        assert!(!report.success);
        assert!(report.failures() > 0);
        // The remaining modules still ran.
        assert!(env.env.is_frozen());
        assert!(env.ops.all_denied());
    }

    #[test]
    fn disabled_modules_are_skipped() {
        let mut env = populated_env();
        let options = HardenOptions {
            runtime: false,
            verify: false,
            ..HardenOptions::default()
        };
        let report = harden(&mut env, &options).unwrap();
        assert!(!report.modules.contains_key("runtime"));
        assert!(!env.env.is_frozen());
        assert!(report.modules.contains_key("builtins"));
    }

    #[test]
    fn verify_flags_tampering() {
        let mut env = populated_env();
        harden(&mut env, &HardenOptions::default()).unwrap();
        // A fresh unsealed env fails verification.
        let fresh: RuntimeEnv<i64> = RuntimeEnv::new();
        let report = verify(&fresh);
        assert!(!report.success);
        assert!(!detect(&fresh).is_empty());
    }
}
