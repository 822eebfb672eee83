// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 Volary Contributors

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use volary_common::config::Settings;
use volary_common::discovery::{Discovery, StaticDiscovery};

mod client;
mod perf;

#[derive(Parser)]
#[command(name = "volary", version, about = "Horizontally scalable instant-messaging backbone.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ServiceArgs {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(long, value_name = "PATH", env = "VOLARY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the edge gateway (client TCP termination).
    Gateway(ServiceArgs),
    /// Run the session state service.
    State(ServiceArgs),
    /// Run the ipconf gateway dispatcher.
    Ipconf(ServiceArgs),
    /// Connect as a client, send messages, print what comes back.
    Client(client::ClientArgs),
    /// Load harness: many concurrent clients against one gateway.
    Perf(perf::PerfArgs),
}

fn load_settings(path: &Option<PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Ok(Settings::default()),
    }
}

/// Cancelled on ctrl-c.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal_token.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Gateway(args) => run_gateway(&args).await,
        Commands::State(args) => run_state(&args).await,
        Commands::Ipconf(args) => run_ipconf(&args).await,
        Commands::Client(args) => client::run(args).await,
        Commands::Perf(args) => perf::run(args).await,
    };

    if let Err(e) = outcome {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run_gateway(args: &ServiceArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.config)?;
    let discovery: Arc<dyn Discovery> =
        Arc::new(StaticDiscovery::from_config(&settings.discovery));
    volary_gateway::run(settings.gateway, discovery, shutdown_token()).await
}

async fn run_state(args: &ServiceArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.config)?;
    volary_state::run(settings.state, settings.cache, shutdown_token()).await
}

async fn run_ipconf(args: &ServiceArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.config)?;
    let discovery: Arc<dyn Discovery> =
        Arc::new(StaticDiscovery::from_config(&settings.discovery));
    volary_ipconf::run(settings.ipconf, discovery, shutdown_token()).await
}
