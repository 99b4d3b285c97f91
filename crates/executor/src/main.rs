use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use px_bus::BusClient;
use px_domain::config::Settings;
use px_executor::cancel::RunningJobs;
use px_executor::{listener, worker};

#[derive(Parser)]
#[command(name = "plexus-executor", about = "Plexus inference executor")]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-executor");
    Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("connecting to the event bus")?;

    let registry = Arc::new(RunningJobs::new());

    // The cancellation listener runs beside the job consumer; both share
    // the running-jobs registry.
    {
        let bus = bus.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = listener::run(bus, registry).await {
                tracing::error!(error = %e, "cancellation listener exited");
            }
        });
    }

    tracing::info!(prefetch = settings.executor_prefetch, "executor starting");
    worker::run_worker(bus, settings, registry).await?;
    Ok(())
}
