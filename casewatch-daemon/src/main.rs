//! casewatch entry point.

use casewatch_core::WatchConfig;
use casewatch_daemon::{
    build_runner, init_tracing, run_once, watch_task, CliArgs, DaemonResult, TelemetryConfig,
    WatchMetrics, WatchSchedule,
};
use std::process::ExitCode;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "casewatch exiting");
            eprintln!("casewatch: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DaemonResult<()> {
    let args = CliArgs::from_env()?;
    init_tracing(&TelemetryConfig::from_env())?;

    let config = WatchConfig::load(args.config.as_deref())?;
    tracing::info!(
        org_id = %config.org_id,
        project_id = %config.project_id,
        config_file = ?args.config,
        once = args.once,
        "Configuration loaded"
    );

    let mut runner = build_runner(&config).await?;
    let schedule = WatchSchedule::from_config(&config);

    if args.once {
        let metrics = WatchMetrics::new();
        let summary = run_once(&mut runner, schedule, &metrics).await?;
        tracing::info!(
            events = summary.events,
            created = summary.created,
            deletions = metrics.snapshot().deletions,
            "Single cycle completed"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(watch_task(runner, schedule, shutdown_rx));

    tokio::select! {
        result = &mut task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Watch task ended unexpectedly");
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = task.await {
        tracing::error!(error = %e, "Watch task panicked during shutdown");
    }
    Ok(())
}
