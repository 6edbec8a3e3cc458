use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use quarry_config::ConfigLoader;
use quarry_gateway::GatewayServer;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quarry", version, about = "Schema-migrated user registry service")]
struct Cli {
    /// Path to a config file (YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the database file
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quarry=info")),
        )
        .init();

    let cli = Cli::parse();

    // Migration errors surface here and must fail the process: the service
    // never runs against a schema it cannot verify.
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ConfigLoader::load(cli.config.as_deref())?;

    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(database) = cli.database {
        config.database.file = Some(database);
    }

    GatewayServer::new(config).run().await?;
    Ok(())
}
