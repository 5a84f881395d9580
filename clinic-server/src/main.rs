//! # Clinic Server
//!
//! Patients, visits and visit images over HTTP. Image bytes live on a
//! Cloudinary-compatible media host, everything else in PostgreSQL.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;

use clinic_server::infra::{
    config::{Config, DatabaseConfig},
    startup::{build_state, connect_database, init_tracing, serve},
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(about = "HTTP API for clinic patient and visit records")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

fn load_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server_host = host;
    }
    Ok(config)
}

async fn run_db_migrate() -> anyhow::Result<()> {
    let database = DatabaseConfig::from_env().context("failed to load database configuration")?;
    let pg = connect_database(&database).await?;
    pg.initialize_schema()
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Some(Command::Db(DbCommand::Migrate)) = cli.command {
        return run_db_migrate().await;
    }

    let config = load_config(&cli.serve)?;
    let state = build_state(config).await?;
    serve(state).await
}
