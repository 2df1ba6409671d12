// picdeck daemon
// Entry point and application setup

use picdeck::app;
use picdeck::services::SchedulerService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "picdeck=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting picdeck");

    if let Err(e) = run().await {
        tracing::error!("picdeck stopped with an error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> picdeck::error::Result<()> {
    let state = app::setup(app::default_data_dir()).await?;

    let scheduler = SchedulerService::new(state.reconciler.clone()).await?;
    scheduler.start().await?;
    scheduler
        .schedule_sweep(
            state.settings.sweep_frequency()?,
            state.settings.storage.sweep_enabled,
        )
        .await?;

    // Collect whatever a previous run left behind
    if state.settings.storage.sweep_enabled {
        if let Err(e) = state.reconciler.sweep().await {
            tracing::error!("Startup reconciliation sweep failed: {}", e);
        }
    }

    tracing::info!("picdeck ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    scheduler.shutdown().await?;

    Ok(())
}
