use std::sync::Arc;

use anyhow::Context;
use clinic_core::database::PostgresDatabase;
use clinic_core::media_store::CloudinaryMediaStore;
use clinic_core::{ClinicCoordinator, ClinicUnitOfWork};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::infra::{
    app_state::AppState,
    config::{Config, DatabaseConfig},
};
use crate::routes;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,clinic.consistency=info,tower_http=warn,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn connect_database(database: &DatabaseConfig) -> anyhow::Result<PostgresDatabase> {
    PostgresDatabase::new(&database.url, &database.pool)
        .await
        .context("failed to connect to PostgreSQL")
}

/// Connect both stores and assemble the coordinator.
pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let postgres = connect_database(&config.database).await?;

    if config.run_migrations {
        postgres
            .initialize_schema()
            .await
            .context("database migration failed")?;
        info!("Database migrations applied");
    } else {
        warn!("RUN_MIGRATIONS=false, assuming the schema is current");
    }

    let media = CloudinaryMediaStore::new(config.media.clone())
        .context("failed to build media store client")?;
    info!(
        cloud = %config.media.cloud_name,
        folder = %config.media.folder,
        "media store configured"
    );

    let coordinator = ClinicCoordinator::new(
        ClinicUnitOfWork::from_postgres(&postgres),
        Arc::new(media),
        config.coordinator,
    );

    Ok(AppState::new(
        Arc::new(config),
        coordinator,
        Some(Arc::new(postgres)),
    ))
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config().bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting clinic server on {addr}");

    let app = routes::create_app(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}
