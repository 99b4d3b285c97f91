use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_tools::rpc::ToolServicer;
use px_tools::state::AppState;
use px_tools::store::ToolStore;
use px_tools::{api, user_cleanup};

#[derive(Parser)]
#[command(name = "plexus-tools", about = "Plexus tool service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the internal RPC server (definitions + execution).
    RpcServer,
    /// Run the user-cleanup worker.
    UserCleanupWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-tools");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let tools = ToolStore::new(pool);
    tools.ensure_schema().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            serve(settings, tools, bus).await
        }
        Command::RpcServer => {
            let servicer = Arc::new(ToolServicer::new(tools));
            if let Err(e) = px_rpc::serve(&settings.tools_rpc_addr, servicer).await {
                tracing::error!(error = %e, "rpc server failed to bind");
                std::process::exit(2);
            }
            Ok(())
        }
        Command::UserCleanupWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("tool user-cleanup worker starting");
            user_cleanup::run(bus, tools).await?;
            Ok(())
        }
    }
}

async fn serve(settings: Arc<Settings>, tools: ToolStore, bus: BusClient) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        tools,
        publisher: bus.publisher(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.tools_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "tool service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
