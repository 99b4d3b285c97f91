use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_inference::api;
use px_inference::state::AppState;
use px_inference::tickets::TicketStore;

#[derive(Parser)]
#[command(name = "plexus-inference", about = "Plexus inference orchestrator")]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-inference");
    Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("connecting to the event bus")?;
    let tickets = TicketStore::connect(&settings.redis_url)
        .await
        .context("connecting to redis")?;

    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        publisher: bus.publisher(),
        tickets,
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.inference_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "inference orchestrator listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
