use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shareconf::ShareConfig;
use sharebox::{open_state, telemetry, web};
use std::path::PathBuf;

/// Share files and text by 8-digit code
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of ./sharebox.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for uploads, shared text and the visitor counter
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve existing content only; refuse uploads and write nothing
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = ShareConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.paths.data_dir = data_dir;
    }
    if let Some(port) = cli.port {
        config.bind.http_port = port;
    }
    if cli.read_only {
        config.paths.read_only = true;
    }

    if let Some(Command::Config) = cli.command {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let telemetry = telemetry::init(&config.telemetry).context("Failed to initialize telemetry")?;

    for file in &sources.files {
        tracing::info!("loaded config from {}", file.display());
    }
    if !sources.env_overrides.is_empty() {
        tracing::info!("environment overrides: {}", sources.env_overrides.join(", "));
    }

    let state = open_state(&config)?;
    let app = web::router(state);

    let addr = config.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("sharebox listening on http://{}", addr);
    tracing::info!("   Upload: POST http://{}/upload", addr);
    tracing::info!("   Share text: POST http://{}/share", addr);
    tracing::info!("   Retrieve: GET http://{}/retrieve?fileCode=<code>", addr);
    tracing::info!("   Visitors: GET http://{}/visitor-count", addr);
    tracing::info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    telemetry.shutdown();

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM (systemd, container runtimes).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down gracefully..."),
    }
}
