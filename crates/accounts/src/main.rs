use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use px_accounts::api;
use px_accounts::state::AppState;
use px_accounts::store::UserStore;
use px_auth::{TokenIssuer, TokenVerifier};
use px_bus::BusClient;
use px_domain::config::Settings;
use px_saga::SagaStore;

#[derive(Parser)]
#[command(name = "plexus-accounts", about = "Plexus accounts service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Run the user-deletion saga finalizer worker.
    UserSagaFinalizer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    px_domain::telemetry::init("plexus-accounts");
    let cli = Cli::parse();
    let settings = Arc::new(Settings::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&settings.database_url)
        .await
        .context("connecting to postgres")?;

    let users = UserStore::new(pool.clone());
    users.ensure_schema().await?;
    let sagas = SagaStore::new(pool);
    sagas.ensure_schema().await?;

    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("connecting to the event bus")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, users, sagas, bus).await,
        Command::UserSagaFinalizer => {
            tracing::info!("user saga finalizer starting");
            px_accounts::finalizer::run(bus, users, sagas).await?;
            Ok(())
        }
    }
}

async fn serve(
    settings: Arc<Settings>,
    users: UserStore,
    sagas: SagaStore,
    bus: BusClient,
) -> anyhow::Result<()> {
    let state = AppState {
        verifier: Arc::new(TokenVerifier::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        issuer: Arc::new(TokenIssuer::new(
            &settings.jwt_signing_key,
            &settings.jwt_issuer,
        )),
        users,
        sagas,
        publisher: bus.publisher(),
        settings: settings.clone(),
    };

    let app = api::router(state);
    let addr = settings.accounts_http_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(2);
        }
    };
    tracing::info!(addr = %addr, "accounts service listening");
    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
