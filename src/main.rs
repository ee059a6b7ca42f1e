use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mlops_service::service_config::ServiceConfig;
use mlops_service::MlopsService;
use tracing::{error, info};

/// Model lifecycle service with REST and gRPC front ends
#[derive(Debug, Parser)]
#[command(name = "mlops-service", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the REST and gRPC servers until Ctrl-C
    Serve {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(long, env = "MLOPS_CONFIG")]
        config: Option<PathBuf>,

        /// REST listener address, overrides server.rest_addr
        #[arg(long)]
        rest_addr: Option<String>,

        /// gRPC listener address, overrides server.grpc_addr
        #[arg(long)]
        grpc_addr: Option<String>,
    },

    /// Prints the effective configuration as JSON
    CheckConfig {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(long, env = "MLOPS_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        config: None,
        rest_addr: None,
        grpc_addr: None,
    });

    match command {
        Command::CheckConfig { config } => {
            let config = ServiceConfig::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Serve {
            config,
            rest_addr,
            grpc_addr,
        } => {
            let mut config = ServiceConfig::load(config.as_deref())?;
            if let Some(addr) = rest_addr {
                config.server.rest_addr = addr;
            }
            if let Some(addr) = grpc_addr {
                config.server.grpc_addr = addr;
            }
            config.validate()?;

            let _log_guard = logging::init(&config.logging)?;
            info!(
                rest_addr = %config.server.rest_addr,
                grpc_addr = %config.server.grpc_addr,
                "Starting mlops-service {}",
                env!("CARGO_PKG_VERSION")
            );

            MlopsService::new(config)?.run(shutdown_signal()).await
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
