//! Resolving env grants into injectable values.

use std::collections::BTreeMap;

use tracing::debug;

use islet_core::{Capability, Grant, PermissionSet};

/// Whether `key` matches a whitelist pattern.
///
/// A pattern ending in `*` matches by prefix (`PUBLIC_*` matches
/// `PUBLIC_URL`); any other pattern matches exactly.
#[must_use]
pub fn matches_pattern(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

fn whitelisted(whitelist: &[String], key: &str) -> bool {
    whitelist.iter().any(|pattern| matches_pattern(pattern, key))
}

/// Materialize a set's env grants into a variable map.
///
/// A blanket `env: true` resolves every whitelisted variable in `source`; a
/// list grant resolves only the named variables, each still filtered
/// through the whitelist. Variables absent from `source` are skipped.
#[must_use]
pub fn resolve_env(
    permissions: &PermissionSet,
    whitelist: &[String],
    source: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let grant = permissions
        .grants()
        .map_or(Grant::Blanket(false), |g| g.get(Capability::Env).clone());

    let mut resolved = BTreeMap::new();
    match grant {
        Grant::Blanket(false) => {},
        Grant::Blanket(true) => {
            for (key, value) in source {
                if whitelisted(whitelist, key) {
                    resolved.insert(key.clone(), value.clone());
                }
            }
        },
        Grant::List(names) => {
            for name in names {
                if !whitelisted(whitelist, &name) {
                    debug!(var = %name, "env grant rejected by whitelist");
                    continue;
                }
                if let Some(value) = source.get(&name) {
                    resolved.insert(name, value.clone());
                }
            }
        },
    }
    resolved
}

/// [`resolve_env`] against the host process environment.
#[must_use]
pub fn resolve_env_from_process(
    permissions: &PermissionSet,
    whitelist: &[String],
) -> BTreeMap<String, String> {
    let source: BTreeMap<String, String> = std::env::vars().collect();
    resolve_env(permissions, whitelist, &source)
}
