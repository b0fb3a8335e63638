//! AgenX marketplace server entry point

use agenx::api::{routes, AppState};
use agenx::cli;
use agenx::config::AppConfig;
use agenx::observability::init_default_logging;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

/// AgenX micro-task marketplace
#[derive(Parser)]
#[command(name = "agenx")]
#[command(about = "Micro-task marketplace with an autonomous fulfillment agent")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AGENX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Run one task in-process
    RunTask {
        /// Task id; a fresh store only knows tasks seeded with --prompt or --url
        id: Option<Uuid>,
        /// Seed an ad-hoc task with this prompt
        #[arg(long)]
        prompt: Option<String>,
        /// Seed an ad-hoc task with this source URL
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting AgenX v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::discover(cli.config.as_deref(), Path::new(".")) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config { show } => handle_config_command(config, show),
        Commands::RunTask { id, prompt, url } => run_task(config, id, prompt, url).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(AppState::build(&config).await?);

    if config.cron.interval_secs > 0 {
        let state = state.clone();
        let every = Duration::from_secs(config.cron.interval_secs);
        info!(interval_secs = config.cron.interval_secs, "Agent ticker started");
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                state.runner.run_batch(state.batch_size).await;
            }
        });
    }

    state.health.set_ready(true);
    let (bound, server) =
        warp::serve(routes(state.clone())).try_bind_with_graceful_shutdown(addr, shutdown_signal())?;
    info!(addr = %bound, "AgenX listening");
    server.await;

    state.health.set_ready(false);
    info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(config: AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(rendered) = cli::config_report(&config, show)? {
        println!("{rendered}");
    }

    info!("Configuration validation complete");
    Ok(())
}

async fn run_task(
    config: AppConfig,
    id: Option<Uuid>,
    prompt: Option<String>,
    url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::build(&config).await?;
    let task = cli::run_task(&state, id, prompt, url).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}
