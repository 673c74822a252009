mod app;
mod config;
mod demo;
mod handlers;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use listenfd::ListenFd;
use prerender::{AssetManifest, ServerRenderer};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{app::create_app, config::ServerConfig, state::AppState};

/// Prerender - Server-side render a component tree under a deadline
#[derive(Parser, Debug)]
#[command(name = "prerender-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host address to bind the server to
    #[arg(long, short = 'H', default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Port to listen on
    #[arg(long, short, default_value = "3000", env = "PORT")]
    port: u16,

    /// Build manifest (JSON). Uses the built-in demo manifest when omitted.
    #[arg(long, env = "PRERENDER_MANIFEST")]
    manifest: Option<PathBuf>,

    /// HTML template. Uses the built-in demo template when omitted.
    #[arg(long, env = "PRERENDER_TEMPLATE")]
    template: Option<PathBuf>,

    /// Logical path of the client entrypoint in the manifest
    #[arg(long, default_value = demo::ENTRYPOINT, env = "PRERENDER_ENTRYPOINT")]
    entrypoint: String,

    /// Simulated latency of the demo greeting lookup, in milliseconds
    #[arg(long, default_value = "50", env = "PRERENDER_DEMO_DELAY_MS")]
    demo_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prerender=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let renderer = init_renderer(&cli)?;
    let app = create_app(AppState::new(renderer));

    // Auto-reload support via listenfd
    let mut listenfd = ListenFd::from_env();
    let listener = match listenfd.take_tcp_listener(0)? {
        // If we are given a tcp listener on listen fd 0, use that one
        Some(listener) => {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        }
        // Otherwise fall back to CLI-specified host:port
        None => {
            let addr = format!("{}:{}", cli.host, cli.port);
            TcpListener::bind(&addr).await?
        }
    };

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Build the renderer from the manifest, template and environment config.
fn init_renderer(cli: &Cli) -> Result<ServerRenderer> {
    let manifest_json = read_or_default(cli.manifest.as_deref(), demo::MANIFEST)?;
    let template = read_or_default(cli.template.as_deref(), demo::TEMPLATE)?;

    let manifest = AssetManifest::from_json(&manifest_json)?;
    let config = ServerConfig::from_env().renderer_config(&cli.entrypoint)?;

    let renderer = ServerRenderer::new(
        demo::root(),
        &template,
        Arc::new(manifest),
        demo::plugins(Duration::from_millis(cli.demo_delay_ms)),
        config,
    )?;

    let config = renderer.config();
    tracing::info!(
        entrypoint = %config.entrypoint,
        deadline_ms = config.deadline_ms,
        max_iterations = config.max_iterations,
        asset_base = %config.asset_base,
        mount_id = %config.mount_id,
        manifest_entries = renderer.manifest().len(),
        plugins = ?renderer.plugin_names(),
        demo_assets = cli.manifest.is_none(),
        "Renderer ready"
    );

    Ok(renderer)
}

fn read_or_default(path: Option<&Path>, default: &str) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => Ok(default.to_string()),
    }
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
