//! Service entry point.

mod dedupe;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use islet_kernel::Kernel;

/// Runs user-submitted snippets in sandboxed worker isolates.
#[derive(Debug, Parser)]
#[command(name = "islet-server", version)]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "ISLET_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = islet_config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    let port = config.port;

    let kernel = Arc::new(Kernel::start_default(config).await?);
    let state = http::AppState::new(Arc::clone(&kernel));
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    kernel.shutdown().await;
    Ok(())
}
