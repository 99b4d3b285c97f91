use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_auth::TokenVerifier;
use px_bus::BusClient;
use px_domain::config::Settings;
use px_projects::state::AppState;
use px_projects::store::ProjectStore;
use px_projects::{api, finalizer, user_cleanup};
use px_saga::SagaStore;

#[derive(Parser)]
#[command(name = "plexus-projects", about = "Plexus project service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the project-deletion saga finalizer worker.
    SagaFinalizer,
    /// Run the user-cleanup initiator worker.
    UserCleanupInitiator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-projects");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let projects = ProjectStore::new(pool.clone());
    projects.ensure_schema().await?;
    let sagas = SagaStore::new(pool);
    sagas.ensure_schema().await?;

    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("connecting to the event bus")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, projects, sagas, bus).await,
        Command::SagaFinalizer => {
            tracing::info!("project saga finalizer starting");
            finalizer::run(bus, projects, sagas).await?;
            Ok(())
        }
        Command::UserCleanupInitiator => {
            tracing::info!("project user-cleanup initiator starting");
            user_cleanup::run(bus, projects, settings.project_saga_services.clone()).await?;
            Ok(())
        }
    }
}

async fn serve(
    settings: Arc<Settings>,
    projects: ProjectStore,
    sagas: SagaStore,
    bus: BusClient,
) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        projects,
        sagas,
        publisher: bus.publisher(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.projects_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "project service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
