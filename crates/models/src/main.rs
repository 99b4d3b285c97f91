use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_models::rpc::ModelServicer;
use px_models::state::AppState;
use px_models::store::ModelStore;
use px_models::{api, user_cleanup};

#[derive(Parser)]
#[command(name = "plexus-models", about = "Plexus AI model registry")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the internal RPC server.
    RpcServer,
    /// Run the user-cleanup worker.
    UserCleanupWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-models");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let models = ModelStore::new(pool);
    models.ensure_schema().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            serve(settings, models, bus).await
        }
        Command::RpcServer => {
            let servicer = Arc::new(ModelServicer::new(models));
            if let Err(e) = px_rpc::serve(&settings.models_rpc_addr, servicer).await {
                tracing::error!(error = %e, "rpc server failed to bind");
                std::process::exit(2);
            }
            Ok(())
        }
        Command::UserCleanupWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("model user-cleanup worker starting");
            user_cleanup::run(bus, models).await?;
            Ok(())
        }
    }
}

async fn serve(settings: Arc<Settings>, models: ModelStore, bus: BusClient) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        models,
        publisher: bus.publisher(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.models_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "model registry listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
