//! Subvisor - Entry Point
//!
//! `run` supervises the engine with periodic reloads and the admin API;
//! `generate` prints an engine config for the first reachable candidate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subvisor::api::ApiServer;
use subvisor::config::{Config, LogConfig};
use subvisor::engine::{ConfigBuilder, ProcessSupervisor};
use subvisor::probe::{HttpFunctionalProber, ReachabilityProber, SelectionPolicy};
use subvisor::services::{generate_config, ReloadScheduler, Resolver, SchedulerHandle};
use subvisor::subscription::HttpSubscriptionFetcher;

#[derive(Parser)]
#[command(name = "subvisor")]
#[command(about = "Subscription-driven proxy engine supervisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the engine and reload periodically (default)
    Run,
    /// Write the engine config for the first reachable candidate and exit
    Generate {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing(&config.log);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Generate { output } => generate(config, output).await,
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("subvisor={},tower_http=info", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        subscription = %config.subscription.url,
        engine = %config.engine.binary,
        http_port = config.engine.http_port,
        socks_port = config.engine.socks_port,
        reload_interval_secs = config.reload_interval_secs,
        selection = %config.probe.selection,
        "Starting Subvisor"
    );

    let fetcher = HttpSubscriptionFetcher::new(&config.subscription.url, config.fetch_timeout())?;
    let functional = HttpFunctionalProber::new(
        &config.probe_proxy_url(),
        &config.probe.url,
        config.probe_timeout(),
        config.probe_backoff(),
    )?;

    let resolver = Resolver::new(
        Box::new(fetcher),
        ReachabilityProber::new(config.dial_timeout(), config.probe.selection),
        ConfigBuilder::new(&config.engine),
        Box::new(ProcessSupervisor::new(&config.engine)),
        Box::new(functional),
        config.probe.retries,
    );

    let (handle, channels) = SchedulerHandle::new();
    let handle = Arc::new(handle);
    let scheduler = ReloadScheduler::new(
        resolver,
        config.reload_interval(),
        channels.requests,
        channels.status_tx,
    );
    let mut scheduler_task = tokio::spawn(scheduler.run(channels.shutdown));

    // Admin API stops together with the scheduler
    let (api_shutdown_tx, api_shutdown) = tokio::sync::watch::channel(false);
    let api_task = if config.api.enabled {
        let api_server = ApiServer::new(config.api.clone(), handle.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = api_server.run(api_shutdown).await {
                error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            handle.shutdown();
            scheduler_task.await
        }
        joined = &mut scheduler_task => joined,
    };

    let _ = api_shutdown_tx.send(true);
    if let Some(task) = api_task {
        let _ = task.await;
    }

    match outcome {
        Ok(Ok(())) => {
            info!("Subvisor stopped");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "No engine could be started");
            Err(e).context("initial resolution failed")
        }
        Err(e) => Err(e).context("reload scheduler panicked"),
    }
}

async fn generate(config: Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let fetcher = HttpSubscriptionFetcher::new(&config.subscription.url, config.fetch_timeout())?;
    let prober = ReachabilityProber::new(config.dial_timeout(), SelectionPolicy::FirstReachable);
    let builder = ConfigBuilder::new(&config.engine);

    let (candidate, engine_config) = generate_config(&fetcher, &prober, &builder).await?;
    info!(candidate = %candidate, address = %candidate.address(), "Selected candidate");

    let rendered = serde_json::to_string_pretty(&engine_config)?;
    match output {
        Some(path) => std::fs::write(&path, rendered + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", rendered),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
