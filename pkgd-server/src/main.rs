//! `pkgd` command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pkgd_core::{Registry, RegistryConfig, RepublishPolicy};
use pkgd_logging::{init_subscriber, LogSettings};
use pkgd_server::run_server;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pkgd")]
#[command(about = "pkgd - self-hosted npm-compatible package registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; missing files fall back to defaults
    #[arg(long, default_value = "pkgd.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry server
    Start {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind to
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for package storage
        #[arg(long)]
        data: Option<PathBuf>,

        /// Public registry URL used in tarball links
        #[arg(long)]
        url: Option<String>,

        /// Republish policy: overwrite or forbid
        #[arg(long)]
        republish: Option<RepublishPolicy>,
    },

    /// Rebuild the index from disk once and print the summary
    Reindex {
        /// Data directory for package storage
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

fn load_config(path: &Path, data: Option<PathBuf>) -> Result<RegistryConfig> {
    let mut config = RegistryConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(data) = data {
        config.storage_root = data;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_subscriber(&LogSettings::from_env());

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            host,
            port,
            data,
            url,
            republish,
        } => {
            let mut config = load_config(&cli.config, data)?;
            match url {
                Some(url) => config.set_registry_url(&url),
                None if config.registry_url() == RegistryConfig::default().registry_url() => {
                    config.set_registry_url(&format!("http://localhost:{port}"));
                }
                None => {}
            }
            if let Some(policy) = republish {
                config = config.with_republish(policy);
            }
            run_server(&host, port, config).await
        }

        Commands::Reindex { data } => {
            let config = load_config(&cli.config, data)?;
            let registry = Registry::open(config).await?;
            let report = registry.reload_all().await?;
            for failure in &report.failed {
                eprintln!(
                    "failed: {} ({} stage): {}",
                    failure.path.display(),
                    failure.stage,
                    failure.reason
                );
            }
            println!("{}", serde_json::to_string_pretty(&registry.summary())?);
            Ok(())
        }
    }
}
