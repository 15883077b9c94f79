use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digest_core::{
    load_config, validate_config, Config, DigestRunner, PollSchedule, ReportHistory,
    SqliteReportHistory,
};
use digest_server::api::create_router;
use digest_server::daemon::{run_once, Daemon};
use digest_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when a one-shot run had failing agents.
async fn run() -> Result<bool> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    // Determine config path
    let config_path = std::env::var("DIGEST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!(version = VERSION, "Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Agents: {}", config.run.agents.join(", "));
    info!("Notifier: {:?}", config.notifier.kind);
    info!("State file: {:?}", config.storage.state_path);

    let runner =
        Arc::new(DigestRunner::from_config(&config).context("Failed to build digest pipeline")?);

    if once || !config.daemon.enabled {
        return run_single(&runner, &config).await;
    }

    serve(runner, config).await?;
    Ok(true)
}

async fn run_single(runner: &DigestRunner, config: &Config) -> Result<bool> {
    if config.run.agents.is_empty() {
        warn!("No agents configured (run.agents), nothing to do");
        return Ok(true);
    }

    let Some(summary) = run_once(runner, &config.run.agents, shutdown_signal()).await else {
        return Ok(false);
    };

    for failure in &summary.failures {
        error!(
            agent = %failure.agent,
            stage = failure.error.stage(),
            "Agent run failed: {}",
            failure.error
        );
    }
    info!(
        succeeded = summary.succeeded(),
        partial = summary.partial(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "Digest run complete"
    );
    Ok(!summary.has_failures())
}

async fn serve(runner: Arc<DigestRunner>, config: Config) -> Result<()> {
    let schedule = PollSchedule::from_config(&config)
        .context("Invalid daemon schedule (business hours or display offset)")?;

    let mut app_state = AppState::new(config.clone());
    if config.storage.history {
        let history: Arc<dyn ReportHistory> = Arc::new(
            SqliteReportHistory::new(&config.storage.database_path)
                .context("Failed to open report history")?,
        );
        app_state = app_state.with_history(history);
    }
    let state = Arc::new(app_state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon = Daemon::new(runner, Arc::clone(&state), schedule, config.run.agents.clone());
    let daemon_handle = tokio::spawn(daemon.run(shutdown_rx));

    let app = create_router(state);

    let addr = SocketAddr::new(config.daemon.host, config.daemon.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = daemon_handle.await {
        warn!("Daemon task ended abnormally: {}", e);
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
