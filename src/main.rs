// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! AccuPath command line: simulate request chains, inspect configuration
//! and push buffered stats to a collector.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use accupath::config::{self, CliOptions, ResolvedConfig};
use accupath::events::{EventArgs, TriggerEvent};
use accupath::pathway::PathwayState;
use accupath::telemetry::{init_telemetry, TelemetryConfig};
use accupath::{Tracker, VERSION};

/// AccuPath - distributed pathway tracking and latency aggregation.
#[derive(Parser)]
#[command(name = "accupath")]
#[command(author, version, about = "Distributed pathway tracking", long_about = None)]
struct Cli {
    /// Config file to use instead of searching the working directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service name of this node
    #[arg(long, global = true)]
    service: Option<String>,

    /// Deployment environment
    #[arg(long, global = true)]
    env: Option<String>,

    /// Host name of this node
    #[arg(long, global = true)]
    hostname: Option<String>,

    /// Collector base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Collector API key
    #[arg(long, global = true, hide_env_values = true, env = "ACCUPATH_API_KEY")]
    api_key: Option<String>,

    /// Tag stamped on new pathways
    #[arg(long, global = true)]
    tag: Option<String>,

    /// Bucket width in seconds
    #[arg(long, global = true)]
    bucket_size: Option<u64>,

    /// Verify checkpoint chains before submitting stats
    #[arg(long, global = true)]
    verify_chain: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for accupath.
#[derive(Subcommand)]
enum Commands {
    /// Run requests through an in-process chain of services and print the stats
    Simulate {
        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Show the resolved configuration
    Config,

    /// Simulate a chain, then flush every node's stats to the collector
    Flush {
        #[command(flatten)]
        chain: ChainArgs,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct ChainArgs {
    /// Number of services in the chain
    #[arg(long, default_value_t = 3)]
    hops: usize,

    /// Number of requests sent through the chain
    #[arg(short = 'n', long, default_value_t = 1)]
    requests: usize,

    /// Work simulated inside each service, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig::from_verbosity(cli.verbose).with_ansi(true))?;

    let cli_options = CliOptions {
        config_file: cli.config,
        service: cli.service,
        env: cli.env,
        hostname: cli.hostname,
        api_key: cli.api_key,
        base_url: cli.base_url,
        tag: cli.tag,
        bucket_size_secs: cli.bucket_size,
        verify_chain: if cli.verify_chain { Some(true) } else { None },
        ..Default::default()
    };

    let workspace_root = std::env::current_dir()?;
    let config = config::load_config(&workspace_root, cli_options)?;

    match cli.command {
        Commands::Simulate { chain } => {
            let trackers = build_chain(&config, chain.hops)?;
            run_chain(&trackers, &chain).await;
            for tracker in &trackers {
                println!("{}", tracker.node().service.bright_cyan().bold());
                println!("{}", tracker.aggregator().report());
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            let key_state = if config.api_key.is_some() { "set" } else { "unset" };
            println!("{} {}", "apiKey:".dimmed(), key_state);
            println!("{} {}", "collector:".dimmed(), config.collector_url());
        }
        Commands::Flush { chain } => {
            let trackers = build_chain(&config, chain.hops)?;
            run_chain(&trackers, &chain).await;
            println!("{} {}", "→".cyan(), config.collector_url());

            let mut failed = false;
            for tracker in &trackers {
                let service = &tracker.node().service;
                match tracker.flush_now().await {
                    Ok(outcome) => println!(
                        "{} {}: {} sent, {} kept",
                        "✓".green(),
                        service,
                        outcome.sent,
                        outcome.kept
                    ),
                    Err(err) => {
                        failed = true;
                        eprintln!("{} {}: {}", "✗".red(), service, err);
                    }
                }
            }
            if failed {
                anyhow::bail!("flush failed for at least one node");
            }
        }
        Commands::Version => {
            println!("accupath {}", VERSION);
        }
    }

    Ok(())
}

/// One tracker per hop, named after the configured service.
fn build_chain(config: &ResolvedConfig, hops: usize) -> anyhow::Result<Vec<Tracker>> {
    (0..hops.max(1))
        .map(|hop| {
            let hop_config = ResolvedConfig {
                service: format!("{}-{}", config.service, hop),
                ..config.clone()
            };
            Ok(Tracker::new(hop_config)?)
        })
        .collect()
}

async fn run_chain(trackers: &[Tracker], chain: &ChainArgs) {
    let delay = Duration::from_millis(chain.delay_ms);
    for _ in 0..chain.requests {
        let mut inbound: HashMap<String, String> = HashMap::new();
        serve(trackers, &mut inbound, delay).await;
    }
}

/// Handle a request at `trackers[0]`, calling the rest of the chain.
async fn serve(
    trackers: &[Tracker],
    inbound: &mut HashMap<String, String>,
    delay: Duration,
) -> HashMap<String, String> {
    let mut reply: HashMap<String, String> = HashMap::new();
    let Some((tracker, downstream)) = trackers.split_first() else {
        return reply;
    };

    let mut state = PathwayState::new();
    tracker.dispatch(
        TriggerEvent::HttpRequestHeaderExtraction,
        &mut state,
        &mut EventArgs::with_headers(inbound),
    );
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if !downstream.is_empty() {
        let mut outbound: HashMap<String, String> = HashMap::new();
        tracker.dispatch(
            TriggerEvent::HttpRequestHeaderInjection,
            &mut state,
            &mut EventArgs::with_headers(&mut outbound),
        );
        let mut response = Box::pin(serve(downstream, &mut outbound, delay)).await;
        tracker.dispatch(
            TriggerEvent::HttpResponseHeaderExtraction,
            &mut state,
            &mut EventArgs::with_headers(&mut response).status(200),
        );
    }

    tracker.dispatch(
        TriggerEvent::HttpResponseHeaderInjection,
        &mut state,
        &mut EventArgs::with_headers(&mut reply),
    );
    reply
}
