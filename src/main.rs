use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cortex_cost::cli::{self, Cli, Commands, ConfigCommands};
use cortex_cost::config::Config;
use cortex_cost::engine::{spawn_snapshot_task, SnapshotJob};
use cortex_cost::AppState;

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config check reports load errors itself
    if let Some(Commands::Config(ConfigCommands::Check)) = &cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("warn"));
        return cli::cmd_config_check(&cli);
    }

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();
    init_logging(&log_level);

    match &cli.command {
        Some(Commands::Serve) | None => serve(config).await,
        Some(_) => cli::run_command(&cli, &config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting cortex-cost v{}", env!("CARGO_PKG_VERSION"));

    let db = cli::open_database(&config).await?;
    let state = Arc::new(AppState::new(config.clone(), db));

    if config.snapshot.enabled {
        let job = SnapshotJob::new(
            state.usage_source.clone(),
            state.snapshot_store.clone(),
            config.report.lookback_days,
        )
        .with_retention(config.snapshot.retention_days);
        spawn_snapshot_task(job, config.snapshot.interval_secs);
    }

    let app = cortex_cost::api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
