use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_data::object_store::{FsStore, ObjectStore};
use px_data::rpc::DataServicer;
use px_data::state::AppState;
use px_data::store::FileStore;
use px_data::{api, project_cleanup};
use px_domain::config::Settings;

#[derive(Parser)]
#[command(name = "plexus-data", about = "Plexus data (file) service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the internal RPC server (metadata + content).
    RpcServer,
    /// Run the project-cleanup worker.
    ProjectCleanupWorker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-data");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let files = FileStore::new(pool);
    files.ensure_schema().await?;
    let objects: Arc<dyn ObjectStore> = Arc::new(FsStore::new(&settings.object_store_root));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            serve(settings, files, objects, bus).await
        }
        Command::RpcServer => {
            let servicer = Arc::new(DataServicer::new(
                files,
                objects,
                settings.data_public_url.clone(),
            ));
            if let Err(e) = px_rpc::serve(&settings.data_rpc_addr, servicer).await {
                tracing::error!(error = %e, "rpc server failed to bind");
                std::process::exit(2);
            }
            Ok(())
        }
        Command::ProjectCleanupWorker => {
            let bus = BusClient::connect(&settings.bus_url)
                .await
                .context("connecting to the event bus")?;
            tracing::info!("data project-cleanup worker starting");
            project_cleanup::run(bus, files, objects).await?;
            Ok(())
        }
    }
}

async fn serve(
    settings: Arc<Settings>,
    files: FileStore,
    objects: Arc<dyn ObjectStore>,
    bus: BusClient,
) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        files,
        objects,
        publisher: bus.publisher(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.data_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "data service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
