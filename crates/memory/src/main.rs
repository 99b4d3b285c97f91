use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_memory::rpc::MemoryServicer;
use px_memory::state::AppState;
use px_memory::store::MemoryStore;
use px_memory::{api, context_update, project_cleanup};

#[derive(Parser)]
#[command(name = "plexus-memory", about = "Plexus memory service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the internal RPC server (history retrieval).
    RpcServer,
    /// Run the context-update worker.
    ContextUpdateWorker,
    /// Run the project-cleanup worker.
    ProjectCleanupWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-memory");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let memory = MemoryStore::new(pool);
    memory.ensure_schema().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            serve(settings, memory, bus).await
        }
        Command::RpcServer => {
            let servicer = Arc::new(MemoryServicer::new(memory));
            if let Err(e) = px_rpc::serve(&settings.memory_rpc_addr, servicer).await {
                tracing::error!(error = %e, "rpc server failed to bind");
                std::process::exit(2);
            }
            Ok(())
        }
        Command::ContextUpdateWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("memory context-update worker starting");
            context_update::run(bus, memory).await?;
            Ok(())
        }
        Command::ProjectCleanupWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("memory project-cleanup worker starting");
            project_cleanup::run(bus, memory).await?;
            Ok(())
        }
    }
}

async fn serve(settings: Arc<Settings>, memory: MemoryStore, bus: BusClient) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        memory,
        publisher: bus.publisher(),
        http: reqwest::Client::new(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.memory_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "memory service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
