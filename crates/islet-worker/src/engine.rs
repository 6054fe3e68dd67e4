//! Engine construction and per-request API bindings.
//!
//! Script functions in the engine resolve registered functions globally but
//! never see host scope variables, so every installed tool is exposed as a
//! set of registered functions closing over that request's API instance.
//! The engine is rebuilt per request, which also discards any engine-level
//! state between snippets.

use std::collections::BTreeMap;

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position};
use serde_json::Value;
use tracing::warn;

use islet_sandbox::Scope;
use islet_tools::{ApiError, ChannelApi, CryptoApi, DbApi};

use crate::config::WorkerConfig;
use crate::console::ConsoleApi;

/// Rethrow an API error into the engine as a `{name, message}` error
/// object so the snippet (and the exception log) sees the original name.
#[must_use]
pub fn throw_api(err: ApiError) -> Box<EvalAltResult> {
    let mut map = rhai::Map::new();
    map.insert("name".into(), err.name.into());
    map.insert("message".into(), err.message.into());
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from_map(map),
        Position::NONE,
    ))
}

fn drain_via_context(ctx: &NativeCallContext<'_>, api: &ChannelApi) {
    api.drain(|handler, topic, data| {
        let payload = rhai::serde::to_dynamic(data).unwrap_or(Dynamic::UNIT);
        if let Err(err) =
            handler.call_within_context::<Dynamic>(ctx, (topic.to_string(), payload))
        {
            warn!(error = %err, "channel handler failed");
            api.report_handler_error(&err.to_string());
        }
    });
}

/// Build a fresh engine with safety limits armed and dynamic evaluation
/// disabled.
#[must_use]
pub fn build(config: &WorkerConfig) -> Engine {
    let mut engine = Engine::new();

    engine.disable_symbol("eval");
    if config.max_operations > 0 {
        engine.set_max_operations(config.max_operations);
    }
    engine.set_max_call_levels(64);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(100_000);

    engine
}

/// Bind the request's installed APIs onto `engine`.
///
/// Which functions exist is decided by what the scope actually holds: a
/// request without the crypto tool simply has no `crypto_*` functions to
/// call. `env(name)` reads the resolved environment values.
pub fn bind_request(
    engine: &mut Engine,
    scope: &Scope<Dynamic>,
    env: BTreeMap<String, String>,
) {
    engine.register_fn("env", move |name: &str| -> Dynamic {
        env.get(name).map_or(Dynamic::UNIT, |value| value.clone().into())
    });

    if let Some(console) = typed_slot::<ConsoleApi>(scope, "console") {
        let api = console.clone();
        engine.register_fn("console_log", move |value: Dynamic| {
            api.log(value.to_string());
        });
        let api = console.clone();
        engine.register_fn("console_info", move |value: Dynamic| {
            api.info(value.to_string());
        });
        let api = console.clone();
        engine.register_fn("console_warn", move |value: Dynamic| {
            api.warn(value.to_string());
        });
        let api = console;
        engine.register_fn("console_error", move |value: Dynamic| {
            api.error(value.to_string());
        });
    }

    if let Some(crypto) = typed_slot::<CryptoApi>(scope, "crypto") {
        let api = crypto.clone();
        engine.register_fn(
            "crypto_get_random_values",
            move |len: i64| -> Result<rhai::Blob, Box<EvalAltResult>> {
                api.get_random_values(len).map_err(throw_api)
            },
        );
        let api = crypto.clone();
        engine.register_fn(
            "crypto_random_uuid",
            move || -> Result<String, Box<EvalAltResult>> {
                api.random_uuid().map_err(throw_api)
            },
        );
        let api = crypto;
        engine.register_fn(
            "crypto_digest",
            move |algorithm: &str, data: rhai::Blob| -> Result<rhai::Blob, Box<EvalAltResult>> {
                api.digest(algorithm, &data).map_err(throw_api)
            },
        );
    }

    if let Some(channel) = typed_slot::<ChannelApi>(scope, "channel") {
        let api = channel.clone();
        engine.register_fn(
            "channel_emit",
            move |ctx: NativeCallContext,
                  topic: &str,
                  data: Dynamic|
                  -> Result<(), Box<EvalAltResult>> {
                let value: Value = rhai::serde::from_dynamic(&data)?;
                api.emit(topic, value).map_err(throw_api)?;
                drain_via_context(&ctx, &api);
                Ok(())
            },
        );
        let api = channel.clone();
        engine.register_fn(
            "channel_on",
            move |ctx: NativeCallContext,
                  topic: &str,
                  handler: FnPtr|
                  -> Result<(), Box<EvalAltResult>> {
                api.subscribe(topic, handler).map_err(throw_api)?;
                drain_via_context(&ctx, &api);
                Ok(())
            },
        );
        let api = channel;
        engine.register_fn("channel_off", move |topic: &str, handler: FnPtr| {
            api.unsubscribe(topic, handler.fn_name());
        });
    }

    if let Some(db) = typed_slot::<DbApi>(scope, "db") {
        let api = db.clone();
        engine.register_fn(
            "db_query",
            move |statement: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                let rows = api.query(statement, Value::Null).map_err(throw_api)?;
                rhai::serde::to_dynamic(rows)
            },
        );
        let api = db;
        engine.register_fn(
            "db_query",
            move |statement: &str, params: Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
                let params: Value = rhai::serde::from_dynamic(&params)?;
                let rows = api.query(statement, params).map_err(throw_api)?;
                rhai::serde::to_dynamic(rows)
            },
        );
    }
}

fn typed_slot<T: Clone + Send + Sync + 'static>(
    scope: &Scope<Dynamic>,
    key: &str,
) -> Option<T> {
    scope.get(key).and_then(|slot| slot.value.clone().try_cast::<T>())
}
