//! Spawn-time environment policy for worker processes.
//!
//! Workers are spawned with a cleared environment; only variables that pass
//! this policy are copied over from the host. The blocklist covers
//! variables that can inject code or libraries into the worker, redirect
//! its trust anchors, or intercept its traffic. Every component that
//! launches a worker must route the environment through [`scrub_spawn_env`]
//! rather than maintaining its own inline list.

/// Env vars that must never reach a worker process.
const BLOCKED_SPAWN_ENV: &[&str] = &[
    // Library injection (Linux)
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    // Library injection (macOS)
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    // Interpreter startup injection
    "NODE_OPTIONS",
    "PYTHONSTARTUP",
    "BASH_ENV",
    "ENV",
    // TLS/CA trust redirection
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "OPENSSL_CONF",
    "NODE_EXTRA_CA_CERTS",
    // Traffic interception
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
    // Temp directory redirection
    "TMPDIR",
    "TEMP",
    "TMP",
];

/// Prefixes blocked entirely (case-insensitive), catching novel variants of
/// the loader-control families.
const BLOCKED_PREFIXES: &[&str] = &["ld_", "dyld_"];

/// Whether `key` must not be forwarded to a spawned worker.
#[must_use]
pub fn is_blocked_spawn_env(key: &str) -> bool {
    if BLOCKED_SPAWN_ENV.iter().any(|k| k.eq_ignore_ascii_case(key)) {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    BLOCKED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Filter an environment down to the entries safe to forward to a worker.
pub fn scrub_spawn_env<I, K, V>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    vars.into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, _)| !is_blocked_spawn_env(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_control_vars_are_blocked() {
        assert!(is_blocked_spawn_env("LD_PRELOAD"));
        assert!(is_blocked_spawn_env("ld_preload"));
        assert!(is_blocked_spawn_env("LD_DEBUG")); // prefix catch
        assert!(is_blocked_spawn_env("DYLD_INSERT_LIBRARIES"));
        assert!(is_blocked_spawn_env("DYLD_PRINT_LIBRARIES"));
    }

    #[test]
    fn trust_and_proxy_vars_are_blocked() {
        assert!(is_blocked_spawn_env("SSL_CERT_FILE"));
        assert!(is_blocked_spawn_env("OPENSSL_CONF"));
        assert!(is_blocked_spawn_env("HTTPS_PROXY"));
        assert!(is_blocked_spawn_env("https_proxy"));
    }

    #[test]
    fn ordinary_vars_pass() {
        assert!(!is_blocked_spawn_env("PUBLIC_API_URL"));
        assert!(!is_blocked_spawn_env("LANG"));
        assert!(!is_blocked_spawn_env("LDFLAGS")); // no ld_ separator
    }

    #[test]
    fn scrub_drops_only_blocked_entries() {
        let scrubbed = scrub_spawn_env(vec![
            ("LD_PRELOAD", "/tmp/evil.so"),
            ("PUBLIC_URL", "https://x"),
            ("HTTP_PROXY", "http://mitm:8080"),
        ]);
        assert_eq!(scrubbed, vec![("PUBLIC_URL".to_string(), "https://x".to_string())]);
    }
}
