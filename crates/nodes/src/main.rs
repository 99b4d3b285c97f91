use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_nodes::clients::ValidationClient;
use px_nodes::rpc::NodeServicer;
use px_nodes::service::NodeService;
use px_nodes::state::AppState;
use px_nodes::store::NodeStore;
use px_nodes::{api, healer, project_cleanup};

#[derive(Parser)]
#[command(name = "plexus-nodes", about = "Plexus node service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the internal RPC server (node details).
    RpcServer,
    /// Run the dependency healer worker.
    DependencyWorker,
    /// Run the project-cleanup worker.
    ProjectCleanupWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-nodes");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let nodes = NodeStore::new(pool);
    nodes.ensure_schema().await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, nodes).await,
        Command::RpcServer => {
            let servicer = Arc::new(NodeServicer::new(nodes));
            if let Err(e) = px_rpc::serve(&settings.nodes_rpc_addr, servicer).await {
                tracing::error!(error = %e, "rpc server failed to bind");
                std::process::exit(2);
            }
            Ok(())
        }
        Command::DependencyWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("node dependency healer starting");
            healer::run(bus, nodes).await?;
            Ok(())
        }
        Command::ProjectCleanupWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("node project-cleanup worker starting");
            project_cleanup::run(bus, nodes).await?;
            Ok(())
        }
    }
}

async fn serve(settings: Arc<Settings>, nodes: NodeStore) -> anyhow::Result<()> {
    let service = Arc::new(NodeService {
        store: nodes,
        validation: ValidationClient::new(settings.clone()),
        models_rpc_addr: settings.models_rpc_addr.clone(),
    });

    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        service,
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.nodes_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "node service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
