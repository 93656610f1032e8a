//! vaultcert - main entry point
//!
//! Keeps an ACME certificate renewed inside Azure Key Vault.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use vaultcert::{signals, Collaborators, Service};
use vaultcert_common::{init_logging, LogFormat};
use vaultcert_config::Config;

/// vaultcert - ACME certificates for Azure Key Vault
#[derive(Parser, Debug)]
#[command(name = "vaultcert")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the renewal service (default)
    Run,
    /// Validate configuration from the environment and exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Check) => check_config(cli.verbose),
        Some(Commands::Run) | None => run_service(cli.verbose),
    }
}

/// Validate configuration and exit
fn check_config(verbose: bool) -> Result<()> {
    init_logging(if verbose { "debug" } else { "info" }, LogFormat::Text);

    let config = Config::from_env().context("Configuration validation failed")?;

    info!("Configuration test successful:");
    info!("  - domains: {}", config.domains);
    info!("  - key vault: {} ({})", config.vault.name, config.vault.endpoint);
    info!("  - certificate: {}", config.vault.cert_name);
    info!("  - credential: {}", config.vault.credential.kind());
    info!(
        "  - check interval: {}",
        humantime::format_duration(config.renewal.check_interval)
    );
    info!("  - renew before: {} days", config.renewal.renew_before_days);
    info!("  - notifications: {}", config.notification.enabled);

    println!("vaultcert: configuration test is successful");

    Ok(())
}

/// Run the service until SIGINT or SIGTERM
fn run_service(verbose: bool) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_logging(level, config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        domains = %config.domains,
        "Starting vaultcert"
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    runtime.block_on(async {
        let collaborators =
            Collaborators::from_config(&config).context("Failed to set up collaborators")?;
        let service = Service::start(&config, collaborators)
            .await
            .context("Failed to start service")?;

        let shutdown = CancellationToken::new();
        signals::cancel_on_signal(shutdown.clone());

        service.run(shutdown).await;
        info!("vaultcert stopped");

        Ok::<(), anyhow::Error>(())
    })
}
