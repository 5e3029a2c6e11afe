//! ROFL CLI - create confidential apps and deploy them to the marketplace.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rofl_deploy::{DeployConfig, Network};

#[derive(Parser)]
#[command(name = "rofl")]
#[command(about = "Create and deploy ROFL apps")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to rofl.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an app from a template and deploy it
    Deploy {
        /// Template file (id, manifest and compose)
        #[arg(long)]
        template: PathBuf,

        /// App file (metadata, secrets, resources and offer)
        #[arg(long)]
        app: PathBuf,

        /// Target network
        #[arg(long, default_value = "testnet")]
        network: Network,

        /// Bearer token for the build backend and artifact store
        #[arg(long, env = "ROFL_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Manage stored build inputs
    Artifacts {
        /// Bearer token for the artifact store
        #[arg(long, env = "ROFL_TOKEN", hide_env_values = true)]
        token: String,

        #[command(subcommand)]
        command: ArtifactCommands,
    },
}

#[derive(Subcommand)]
enum ArtifactCommands {
    /// Upload a file as an artifact
    Upload {
        /// Artifact id
        id: String,
        /// File to upload
        file: PathBuf,
    },

    /// Download an artifact into a file
    Download {
        /// Artifact id
        id: String,
        /// Destination file
        file: PathBuf,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<DeployConfig> {
    Ok(match path {
        Some(path) => DeployConfig::from_file(path)?,
        None => DeployConfig::load()?,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rofl=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config) {
        Ok(config) => match cli.command {
            Commands::Deploy {
                template,
                app,
                network,
                token,
            } => {
                commands::deploy::run(
                    &config,
                    commands::deploy::DeployArgs {
                        template,
                        app,
                        network,
                        token,
                    },
                )
                .await
            }
            Commands::Artifacts { token, command } => match command {
                ArtifactCommands::Upload { id, file } => {
                    commands::artifacts::upload(&config, &id, &file, &token).await
                }
                ArtifactCommands::Download { id, file } => {
                    commands::artifacts::download(&config, &id, &file, &token).await
                }
            },
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
