use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use backupd_core::BackupdConfig;
use backupd_scheduler::JobRegistry;
use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;
mod pipeline;

/// Cron-driven database backup daemon.
#[derive(Parser, Debug)]
#[command(name = "backupd", version, about)]
struct Cli {
    /// Path to backupd.toml (default: ~/.backupd/backupd.toml)
    #[arg(short, long, env = "BACKUPD_CONFIG")]
    config: Option<String>,

    /// Run one create + upload cycle and exit instead of serving.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "backupd_gateway=info,backupd_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // config is read exactly once; a broken file is fatal rather than silently defaulted
    let config = BackupdConfig::load(cli.config.as_deref())?;
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let shutdown_grace = Duration::from_secs(config.gateway.shutdown_grace_secs);

    if config.pipeline.upload_command.is_none() {
        warn!("pipeline.upload_command is not set, backups will stay on this host");
    }

    let registry = Arc::new(JobRegistry::new());
    let state = Arc::new(app::AppState::new(config, Arc::clone(&registry))?);

    if cli.once {
        let artifact = state.scheduler.trigger_manual_backup().await?;
        info!(artifact = %artifact, "one-shot backup finished");
        return Ok(());
    }

    // malformed cron or timezone aborts startup
    state.scheduler.schedule_backups().await?;

    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("backupd listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.stop_scheduled_backups().await;
    if state.scheduler.is_backup_running() {
        info!(grace_secs = shutdown_grace.as_secs(), "waiting for in-flight backup to finish");
        if !state.scheduler.wait_for_idle(shutdown_grace).await {
            warn!("in-flight backup still running after grace period, abandoning it");
        }
    }
    info!("backupd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
