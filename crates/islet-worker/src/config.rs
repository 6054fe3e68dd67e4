//! Worker configuration passed through the spawn environment.

use serde::Deserialize;

/// Crypto tool policy section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CryptoSettings {
    /// Call budget per installed crypto tool.
    pub limit: i64,
    /// Whether digest operations are exposed.
    pub subtle: bool,
    /// Permitted crypto method names; absent means the full set.
    pub methods: Option<Vec<String>>,
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            limit: 1000,
            subtle: false,
            methods: None,
        }
    }
}

/// Service-level worker settings, read from `ISLET_WORKER_CONFIG`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Crypto tool policy.
    pub crypto: CryptoSettings,
    /// Deadline for individual RPC calls to the host.
    pub rpc_timeout_ms: u64,
    /// Engine operation cap; 0 leaves it unlimited (the host deadline is
    /// the authoritative bound).
    pub max_operations: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            crypto: CryptoSettings::default(),
            rpc_timeout_ms: 10_000,
            max_operations: 0,
        }
    }
}

impl WorkerConfig {
    /// Parse from the environment, falling back to defaults on absence or
    /// malformed input.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("ISLET_WORKER_CONFIG")
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: WorkerConfig = serde_json::from_str(r#"{ "crypto": { "subtle": true } }"#).unwrap();
        assert!(config.crypto.subtle);
        assert_eq!(config.crypto.limit, 1000);
        assert_eq!(config.rpc_timeout_ms, 10_000);
        assert_eq!(config.max_operations, 0);
    }
}
