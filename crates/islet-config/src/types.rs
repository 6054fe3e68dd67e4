//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Crypto tool policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSection {
    /// Call budget per installed crypto tool.
    pub limit: i64,
    /// Expose digest operations.
    pub subtle: bool,
    /// Permitted crypto method names; absent exposes the full set.
    pub methods: Option<Vec<String>>,
}

impl Default for CryptoSection {
    fn default() -> Self {
        Self {
            limit: 1000,
            subtle: false,
            methods: None,
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Workers kept alive past idle expiry.
    pub min: usize,
    /// Hard cap on concurrent workers.
    pub max: usize,
    /// Idle expiry in milliseconds.
    pub idle_ms: u64,
    /// Workers spawned at startup.
    pub warmup: usize,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            min: 2,
            max: 8,
            idle_ms: 120_000,
            warmup: 2,
        }
    }
}

/// Database pool tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSection {
    /// Maximum cached connections.
    pub limit: usize,
    /// Idle reap threshold in milliseconds.
    pub idle_timeout_ms: u64,
    /// Reaper period in milliseconds.
    pub cleanup_interval_ms: u64,
}

impl Default for DbSection {
    fn default() -> Self {
        Self {
            limit: 10,
            idle_timeout_ms: 120_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

/// Channel bus limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// Maximum serialized message size in bytes.
    pub max_message_bytes: usize,
    /// Maximum messages per worker per window.
    pub max_messages: usize,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            max_message_bytes: 100_000,
            max_messages: 100,
            window_ms: 1_000,
        }
    }
}

/// Worker process tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Engine operation cap; 0 means unlimited.
    pub max_operations: u64,
    /// Deadline for worker→host RPC calls in milliseconds.
    pub rpc_timeout_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_operations: 0,
            rpc_timeout_ms: 10_000,
        }
    }
}

/// The full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Reject code longer than this many characters.
    pub max_size: usize,
    /// Default per-request deadline in milliseconds.
    pub timeout: u64,
    /// HTTP listen port.
    pub port: u16,
    /// Patterns filtering resolved env grants.
    pub env_whitelist: Vec<String>,
    /// Emit permission warnings.
    pub strict: bool,
    /// Log tools/permissions/duration per response.
    pub audit: bool,
    /// Reject duplicate requests seen within this window, in milliseconds.
    pub dedupe_window_ms: u64,
    /// Path to the worker binary; defaults to a sibling of the server
    /// executable.
    pub worker_cmd: Option<PathBuf>,
    /// Crypto tool policy.
    pub crypto: CryptoSection,
    /// Worker pool tuning.
    pub cluster: ClusterSection,
    /// Database pool tuning.
    pub db: DbSection,
    /// Channel bus limits.
    pub channel: ChannelSection,
    /// Worker process tuning.
    pub worker: WorkerSection,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            timeout: 3_000,
            port: 8793,
            env_whitelist: vec!["PUBLIC_*".to_string()],
            strict: false,
            audit: false,
            dedupe_window_ms: 1_000,
            worker_cmd: None,
            crypto: CryptoSection::default(),
            cluster: ClusterSection::default(),
            db: DbSection::default(),
            channel: ChannelSection::default(),
            worker: WorkerSection::default(),
        }
    }
}

impl KernelConfig {
    /// The worker binary to spawn: the configured path, or the
    /// `islet-worker` sibling of the current executable.
    #[must_use]
    pub fn worker_command(&self) -> PathBuf {
        if let Some(cmd) = &self.worker_cmd {
            return cmd.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("islet-worker")))
            .unwrap_or_else(|| PathBuf::from("islet-worker"))
    }

    /// The worker-side settings serialized into the spawn environment.
    #[must_use]
    pub fn worker_config_value(&self) -> serde_json::Value {
        serde_json::json!({
            "crypto": {
                "limit": self.crypto.limit,
                "subtle": self.crypto.subtle,
                "methods": self.crypto.methods,
            },
            "rpc_timeout_ms": self.worker.rpc_timeout_ms,
            "max_operations": self.worker.max_operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = KernelConfig::default();
        assert_eq!(config.max_size, 100_000);
        assert_eq!(config.timeout, 3_000);
        assert_eq!(config.env_whitelist, vec!["PUBLIC_*".to_string()]);
        assert_eq!(config.cluster.min, 2);
        assert_eq!(config.cluster.max, 8);
        assert_eq!(config.db.limit, 10);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: KernelConfig = toml::from_str(
            r#"
            timeout = 500

            [cluster]
            max = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.timeout, 500);
        assert_eq!(config.cluster.max, 2);
        assert_eq!(config.cluster.min, 2);
        assert_eq!(config.max_size, 100_000);
    }
}
