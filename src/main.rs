use std::sync::Arc;

use clap::Parser;
use poolkeeper::adapter::inbound::cli::output::{self, OutputConfig};
use poolkeeper::adapter::inbound::cli::{check, init, pool_status, serve};
use poolkeeper::cli::{Cli, Commands};
use poolkeeper::error::Result;
use poolkeeper::infrastructure::config::settings::Config;
use poolkeeper::infrastructure::database::{ConnectionDescriptor, DatabaseManager};
use poolkeeper::port::inbound::operator::DatabaseOperator;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    output::configure(OutputConfig {
        json: cli.json,
        quiet: cli.quiet,
    });

    let config = Config::load_or_default(cli.command.config_path())?;
    config.init_logging();

    match run(&cli.command, &config).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "Fatal error");
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Start the store, run one command and release every connection.
///
/// Returns `false` when the command reports the store unhealthy.
async fn run(command: &Commands, config: &Config) -> Result<bool> {
    let bind = match command {
        Commands::Serve(args) => Some(match args.bind {
            Some(addr) => addr,
            None => config.server.socket_addr()?,
        }),
        _ => None,
    };

    let descriptor = ConnectionDescriptor::resolve(&config.database)?;
    let operator: Arc<dyn DatabaseOperator> = Arc::new(DatabaseManager::start(descriptor).await?);

    let outcome = match (command, bind) {
        (Commands::Serve(_), Some(addr)) => {
            info!("poolkeeper starting");
            serve::execute(Arc::clone(&operator), addr).await.map(|()| true)
        }
        (Commands::Check(_), _) => Ok(check::execute(operator.as_ref()).await.is_healthy()),
        (Commands::InitDb(_), _) => init::execute(operator.as_ref()).await.map(|()| true),
        (Commands::PoolStatus(_), _) => {
            pool_status::execute(operator.as_ref());
            Ok(true)
        }
        (Commands::Serve(_), None) => Ok(true),
    };

    operator.shutdown().await;
    outcome
}
