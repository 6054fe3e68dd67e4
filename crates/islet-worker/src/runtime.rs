//! Assembling the hardened runtime and executing packets.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rhai::{AST, Dynamic, Engine, EvalAltResult};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use islet_channel::ChannelEndpoint;
use islet_core::{
    Exception, Grant, LogEntry, Output, Packet, PermissionSet, WorkerMessage,
};
use islet_rpc::RpcClient;
use islet_sandbox::{
    BuiltinObject, BuiltinRegistry, EnvFacade, HardenOptions, Report, RuntimeEnv, SandboxError,
    TypeShape, harden,
};
use islet_tools::{ChannelApi, CryptoPolicy, ToolHost, ToolRegistry};

use crate::config::WorkerConfig;
use crate::console::ConsoleApi;
use crate::engine;

/// Failures while assembling the runtime.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The environment could not be hardened.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// The per-process runtime: tool registry plus the hardened environment
/// model. Serves one request at a time; the engine itself is rebuilt per
/// request so no engine-level state leaks between snippets.
pub struct WorkerRuntime {
    config: WorkerConfig,
    registry: ToolRegistry,
    env_model: RuntimeEnv<Dynamic>,
    host: ToolHost,
    harden_report: Report,
}

impl WorkerRuntime {
    /// Build and harden a runtime.
    ///
    /// # Errors
    ///
    /// [`WorkerError::Sandbox`] when the environment model cannot be
    /// assembled or hardened.
    pub fn new(
        permissions: &PermissionSet,
        config: WorkerConfig,
        outbound: Sender<WorkerMessage>,
        rpc: RpcClient,
        endpoint: Arc<Mutex<ChannelEndpoint<rhai::FnPtr>>>,
    ) -> Result<Self, WorkerError> {
        let registry = ToolRegistry::with_builtins();
        let host = ToolHost {
            outbound: outbound.clone(),
            rpc,
            channel: endpoint,
            crypto: CryptoPolicy {
                limit: config.crypto.limit,
                subtle: config.crypto.subtle,
                methods: config.crypto.methods.clone(),
            },
            env: BTreeMap::new(),
        };

        let mut env_model: RuntimeEnv<Dynamic> = RuntimeEnv::new();
        env_model.builtins = BuiltinRegistry::with_priority(vec!["console"]);
        let objects = [
            ("console", vec!["log", "info", "warn", "error"]),
            ("crypto", vec!["get_random_values", "random_uuid", "digest"]),
            ("channel", vec!["emit", "on", "off"]),
            ("db", vec!["query"]),
        ];
        for (name, properties) in objects {
            env_model
                .builtins
                .register(name, BuiltinObject::with_properties(properties))?;
        }
        let types = [
            ("ConsoleApi", vec!["log", "info", "warn", "error"]),
            ("CryptoApi", vec!["get_random_values", "random_uuid", "digest"]),
            ("ChannelApi", vec!["emit", "on", "off"]),
            ("DbApi", vec!["query"]),
        ];
        for (name, methods) in types {
            env_model.types.register(name, TypeShape::with_methods(methods))?;
        }

        env_model.env = EnvFacade::snapshot(visible_env(permissions));

        env_model.scope.define(
            "console",
            Dynamic::from(ConsoleApi::new(outbound)),
            false,
            false,
        )?;

        let harden_report = harden(&mut env_model, &HardenOptions::default())?;
        debug!(success = harden_report.success, "worker runtime hardened");

        Ok(Self {
            config,
            registry,
            env_model,
            host,
            harden_report,
        })
    }

    /// The hardening report from construction.
    #[must_use]
    pub fn harden_report(&self) -> &Report {
        &self.harden_report
    }

    fn post(&self, entry: LogEntry) {
        let _ = self.host.outbound.send(WorkerMessage::Log { data: entry });
    }

    fn post_exception(&self, name: &str, message: &str, stack: Option<String>) {
        let mut entry = LogEntry::exception(name, message);
        entry.stack = stack;
        self.post(entry);
    }

    fn elapsed_ms(started: Instant) -> u64 {
        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The environment values visible to this request: the boot facade
    /// plus the packet's resolved string globals.
    fn request_env(&self, packet: &Packet) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .env_model
            .env
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        for (key, value) in &packet.globals {
            if let Some(text) = value.as_str() {
                env.insert(key.clone(), text.to_string());
            }
        }
        env
    }

    /// Run one packet to completion. Never fails: everything becomes an
    /// [`Output`], with logs and exceptions streamed as messages first.
    pub fn execute(&mut self, packet: &Packet) -> Output {
        let started = Instant::now();

        let request_env = self.request_env(packet);
        self.host.env = request_env.clone();

        let base_engine = engine::build(&self.config);
        let ast = match base_engine.compile(&packet.code) {
            Ok(ast) => ast,
            Err(err) => {
                self.post_exception("SyntaxError", &err.to_string(), None);
                return Output::failure(Vec::new(), Self::elapsed_ms(started));
            },
        };

        let Some(arity) = ast
            .iter_functions()
            .find(|function| function.name == packet.entry)
            .map(|function| function.params.len())
        else {
            self.post_exception(
                Exception::EntryError.name(),
                &format!("entry export not found: {}", packet.entry),
                None,
            );
            return Output::failure(Vec::new(), Self::elapsed_ms(started));
        };

        for (key, value) in &packet.globals {
            match rhai::serde::to_dynamic(value) {
                Ok(dynamic) => {
                    if let Err(err) = self.env_model.scope.inject(key, dynamic) {
                        warn!(key = %key, error = %err, "global injection rejected");
                    }
                },
                Err(err) => warn!(key = %key, error = %err, "global not representable"),
            }
        }

        let installed = match &packet.context {
            Some(context) => {
                match self
                    .registry
                    .install(context, &mut self.env_model.scope, &self.host)
                {
                    Ok(names) => names,
                    Err(err) => {
                        self.post_exception(
                            Exception::ExecutionError.name(),
                            &err.to_string(),
                            None,
                        );
                        self.env_model.scope.reset(&[]);
                        return Output::failure(Vec::new(), Self::elapsed_ms(started));
                    },
                }
            },
            None => Vec::new(),
        };

        let mut engine = base_engine;
        engine::bind_request(&mut engine, &self.env_model.scope, request_env);

        // Top-level statements can read the scope directly; functions go
        // through the bound APIs.
        let mut scope = rhai::Scope::new();
        for (name, slot) in self.env_model.scope.iter() {
            scope.push_constant(name.to_string(), slot.value.clone());
        }

        let call_result: Result<Dynamic, Box<EvalAltResult>> = if arity == 0 {
            engine.call_fn(&mut scope, &ast, &packet.entry, ())
        } else {
            let input = packet
                .input
                .clone()
                .map_or(Ok(Dynamic::UNIT), rhai::serde::to_dynamic)
                .unwrap_or(Dynamic::UNIT);
            engine.call_fn(&mut scope, &ast, &packet.entry, (input,))
        };

        // Deliver any broadcasts that arrived mid-run, then tear down.
        self.drain_channel(&engine, &ast);
        let teardown_logs =
            self.registry
                .teardown(&installed, &mut self.env_model.scope, &self.host);
        for entry in teardown_logs {
            self.post(entry);
        }

        let duration = Self::elapsed_ms(started);
        match call_result {
            Ok(value) => {
                let result = if value.is_unit() {
                    None
                } else {
                    match rhai::serde::from_dynamic::<Value>(&value) {
                        Ok(json) => Some(json),
                        Err(err) => {
                            self.post_exception(
                                Exception::ExecutionError.name(),
                                &format!("result not serializable: {err}"),
                                None,
                            );
                            return Output::failure(Vec::new(), duration);
                        },
                    }
                };
                Output {
                    ok: true,
                    result,
                    logs: Vec::new(),
                    duration,
                }
            },
            Err(err) => {
                let (name, message) = describe_eval_error(&err);
                let position = err.position();
                let stack = (!position.is_none()).then(|| format!("at {position}"));
                self.post_exception(&name, &message, stack);
                Output::failure(Vec::new(), duration)
            },
        }
    }

    fn drain_channel(&self, engine: &Engine, ast: &AST) {
        let api = ChannelApi::new(
            Arc::clone(&self.host.channel),
            self.host.outbound.clone(),
        );
        api.drain(|handler, topic, data| {
            let payload = rhai::serde::to_dynamic(data).unwrap_or(Dynamic::UNIT);
            if let Err(err) = handler.call::<Dynamic>(engine, ast, (topic.to_string(), payload)) {
                api.report_handler_error(&err.to_string());
            }
        });
    }
}

/// The environment variables the granted permissions let snippet code see.
/// Internal control variables never appear, whatever the grant.
fn visible_env(permissions: &PermissionSet) -> Vec<(String, String)> {
    let grant = permissions
        .grants()
        .map_or(Grant::Blanket(false), |grants| {
            grants.get(islet_core::Capability::Env).clone()
        });
    std::env::vars()
        .filter(|(key, _)| !key.starts_with("ISLET_"))
        .filter(|(key, _)| match &grant {
            Grant::Blanket(allowed) => *allowed,
            Grant::List(names) => names.contains(key),
        })
        .collect()
}

fn describe_eval_error(err: &EvalAltResult) -> (String, String) {
    match err {
        EvalAltResult::ErrorRuntime(value, _) => {
            if let Some(map) = value.read_lock::<rhai::Map>() {
                if let Some(name) = map.get("name") {
                    let message = map
                        .get("message")
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    return (name.to_string(), message);
                }
            }
            ("Error".to_string(), value.to_string())
        },
        EvalAltResult::ErrorTooManyOperations(_) => (
            Exception::ExecutionError.name().to_string(),
            "operation limit exceeded".to_string(),
        ),
        other => (
            Exception::ExecutionError.name().to_string(),
            other.to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{Receiver, channel};
    use std::time::Duration;

    fn runtime_with_rx(config: WorkerConfig) -> (WorkerRuntime, Receiver<WorkerMessage>) {
        let (tx, rx) = channel();
        let rpc = RpcClient::new(tx.clone(), Duration::from_millis(100));
        let endpoint = Arc::new(Mutex::new(ChannelEndpoint::default()));
        let runtime =
            WorkerRuntime::new(&PermissionSet::none(), config, tx, rpc, endpoint).unwrap();
        (runtime, rx)
    }

    fn packet(code: &str) -> Packet {
        Packet {
            code: code.into(),
            input: None,
            entry: "default".into(),
            url: "data:text/plain;base64,".into(),
            globals: BTreeMap::new(),
            context: None,
        }
    }

    fn drain_logs(rx: &Receiver<WorkerMessage>) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let WorkerMessage::Log { data } = message {
                entries.push(data);
            }
        }
        entries
    }

    #[test]
    fn entry_result_round_trips_through_json() {
        let (mut runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        let mut request = packet("fn default(x) { x * 2 }");
        request.input = Some(serde_json::json!(5));

        let output = runtime.execute(&request);
        assert!(output.ok, "unexpected failure");
        assert_eq!(output.result, Some(serde_json::json!(10)));
        assert!(output.logs.is_empty());
    }

    #[test]
    fn console_logs_stream_in_order() {
        let (mut runtime, rx) = runtime_with_rx(WorkerConfig::default());
        let request = packet(
            r#"fn default() { console_log("a"); console_warn("b"); 1 }"#,
        );
        let output = runtime.execute(&request);
        assert!(output.ok);
        assert_eq!(output.result, Some(serde_json::json!(1)));

        let logs = drain_logs(&rx);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "a");
        assert_eq!(logs[0].level, islet_core::LogLevel::Log);
        assert_eq!(logs[1].message, "b");
        assert_eq!(logs[1].level, islet_core::LogLevel::Warn);
    }

    #[test]
    fn thrown_values_become_named_exceptions() {
        let (mut runtime, rx) = runtime_with_rx(WorkerConfig::default());
        let output = runtime.execute(&packet(r#"fn default() { throw "boom" }"#));
        assert!(!output.ok);

        let logs = drain_logs(&rx);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].name.as_deref(), Some("Error"));
        assert_eq!(logs[0].message, "boom");
    }

    #[test]
    fn missing_entry_reports_entry_error() {
        let (mut runtime, rx) = runtime_with_rx(WorkerConfig::default());
        let output = runtime.execute(&packet("fn other() { 1 }"));
        assert!(!output.ok);
        let logs = drain_logs(&rx);
        assert_eq!(logs[0].name.as_deref(), Some("EntryError"));
    }

    #[test]
    fn syntax_errors_fail_without_panicking() {
        let (mut runtime, rx) = runtime_with_rx(WorkerConfig::default());
        let output = runtime.execute(&packet("fn default( {"));
        assert!(!output.ok);
        let logs = drain_logs(&rx);
        assert_eq!(logs[0].name.as_deref(), Some("SyntaxError"));
    }

    #[test]
    fn env_values_are_scoped_to_their_request() {
        let (mut runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        let mut request = packet(r#"fn default() { env("PUBLIC_URL") }"#);
        request
            .globals
            .insert("PUBLIC_URL".into(), serde_json::json!("https://x"));
        let output = runtime.execute(&request);
        assert_eq!(output.result, Some(serde_json::json!("https://x")));

        // The next request must not see the previous request's values.
        let output = runtime.execute(&packet(r#"fn default() { env("PUBLIC_URL") }"#));
        assert!(output.ok);
        assert!(output.result.is_none());
    }

    #[test]
    fn crypto_tool_is_bound_on_request() {
        let (mut runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        let mut request = packet("fn default() { crypto_random_uuid() }");
        request.context = Some(islet_core::ToolContext {
            names: vec!["crypto".into()],
            configs: BTreeMap::new(),
        });
        let output = runtime.execute(&request);
        assert!(output.ok, "unexpected failure");
        let uuid = output.result.unwrap();
        assert_eq!(uuid.as_str().unwrap().len(), 36);
    }

    #[test]
    fn tools_do_not_leak_into_the_next_request() {
        let (mut runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        let mut request = packet("fn default() { crypto_random_uuid() }");
        request.context = Some(islet_core::ToolContext {
            names: vec!["crypto".into()],
            configs: BTreeMap::new(),
        });
        assert!(runtime.execute(&request).ok);

        // Same snippet without the tool context: the binding must be gone.
        let output = runtime.execute(&packet("fn default() { crypto_random_uuid() }"));
        assert!(!output.ok);
    }

    #[test]
    fn crypto_budget_overflow_surfaces_quota_error() {
        let (mut runtime, rx) = runtime_with_rx(WorkerConfig::default());
        let mut request = packet(
            r#"fn default() {
                let i = 0;
                while i < 3 { crypto_random_uuid(); i += 1; }
                true
            }"#,
        );
        request.context = Some(islet_core::ToolContext {
            names: vec!["crypto".into()],
            configs: BTreeMap::from([(
                "crypto".to_string(),
                serde_json::json!({ "limit": 2 }),
            )]),
        });
        let output = runtime.execute(&request);
        assert!(!output.ok);
        let logs = drain_logs(&rx);
        assert_eq!(logs[0].name.as_deref(), Some("QuotaExceededError"));
    }

    #[test]
    fn unit_results_map_to_absent_result() {
        let (mut runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        let output = runtime.execute(&packet("fn default() { }"));
        assert!(output.ok);
        assert!(output.result.is_none());
    }

    #[test]
    fn hardened_runtime_verifies_clean() {
        let (runtime, _rx) = runtime_with_rx(WorkerConfig::default());
        assert!(runtime.harden_report().success);
    }
}
