use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use listenerd::config::Config;
use listenerd::services::ListenerService;
use listenerd::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "listenerd")]
#[command(author, version, about = "Multi-protocol listener management service")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&TracingConfig {
        service_name: "listenerd".to_string(),
        log_level: config.telemetry.log_level.clone(),
        json_logs: config.telemetry.json_logs,
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting listenerd"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let service = ListenerService::new().with_stop_grace(config.settings.stop_grace);

    for spec in &config.listeners {
        let listener = service
            .new_listener(&spec.factory_options())
            .with_context(|| format!("failed to create listener '{}'", spec.name))?;

        if spec.autostart {
            service
                .start(listener.id())
                .with_context(|| format!("failed to start listener '{}'", spec.name))?;
        }
    }

    info!(listeners = config.listeners.len(), "configuration loaded");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for listener in service.listeners() {
        if let Err(e) = service.stop(listener.id()) {
            error!(listener = %listener.id(), error = %e, "stop failed during shutdown");
        }
    }

    info!("shutdown complete");
    Ok(())
}
