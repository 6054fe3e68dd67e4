//! Worker process entry point.

use tracing_subscriber::EnvFilter;

use islet_core::PermissionSet;
use islet_worker::bridge;
use islet_worker::config::WorkerConfig;

fn main() -> anyhow::Result<()> {
    // stdout carries the wire protocol; all tracing goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let permissions = std::env::var("ISLET_PERMISSIONS")
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(PermissionSet::none);
    let config = WorkerConfig::from_env();

    bridge::serve(&permissions, config)
}
