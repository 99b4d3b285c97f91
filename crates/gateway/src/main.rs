use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;

use px_bus::BusClient;
use px_domain::config::Settings;
use px_gateway::consumer;
use px_gateway::registry::ConnectionRegistry;
use px_gateway::tickets::TicketConsumer;
use px_gateway::ws::{results_ws, WsState};

#[derive(Parser)]
#[command(name = "plexus-gateway", about = "Plexus result delivery gateway")]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-gateway");
    Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("connecting to the event bus")?;
    let tickets = TicketConsumer::connect(&settings.redis_url)
        .await
        .context("connecting to redis")?;

    let registry = Arc::new(ConnectionRegistry::new());

    // Background results consumer feeding the socket registry.
    {
        let bus = bus.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = consumer::run(bus, registry).await {
                tracing::error!(error = %e, "results consumer exited");
            }
        });
    }

    let state = WsState { registry, tickets };
    let app = Router::new()
        .route("/ws/results/", get(results_ws))
        .with_state(state);

    let addr = settings.gateway_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "delivery gateway listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
