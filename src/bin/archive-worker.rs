//! archive-worker CLI: runs the capture pipeline against a tracker

use anyhow::Context;
use archive_worker::config::Config;
use archive_worker::fetch::CliFetcher;
use archive_worker::stages::{CheckSchedule, EnvironmentCheck, SystemResolver};
use archive_worker::tracker::HttpTracker;
use archive_worker::upload::{ConcurrencyGate, RsyncUploader};
use archive_worker::{PipelineDeps, PipelineEngine, Worker, run_with_shutdown};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archive-worker", version, about = "Distributed crawling worker")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Downloader nickname (overrides the config file)
    #[arg(long)]
    downloader: Option<String>,
    /// Staging directory (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Items processed in parallel (overrides the config file)
    #[arg(long)]
    concurrent_items: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Claim and process items until interrupted
    Run,
    /// Print the fetch targets of an item name
    Expand {
        /// Item name, e.g. verizon36pack:abc
        item: String,
    },
    /// Run the proxy/firewall check once
    CheckEnvironment,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Command::Run => cmd_run(load_config(&cli)?).await,
        Command::Expand { item } => cmd_expand(item),
        Command::CheckEnvironment => cmd_check_environment(&load_config(&cli)?).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::read_file(path)?,
        None => Config::default(),
    };

    if let Some(downloader) = &cli.downloader {
        config.downloader = downloader.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(n) = cli.concurrent_items {
        config.concurrent_items = n;
    }
    Ok(config)
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;

    let provenance = archive_worker::utils::provenance(&config);
    let tracker = Arc::new(HttpTracker::new(&config.tracker, &config.project.name)?);
    let fetcher = CliFetcher::from_config(&config.fetch)?;
    let uploader = RsyncUploader::from_config(&config.upload)?;

    tracing::info!(
        downloader = %config.downloader,
        version = %config.project.version,
        tracker = %tracker.base_url(),
        fetcher = %fetcher.binary_path().display(),
        rsync = %uploader.binary_path().display(),
        "starting worker"
    );

    let gate = ConcurrencyGate::new(config.upload.concurrency);
    let engine = Arc::new(PipelineEngine::standard(PipelineDeps {
        provenance,
        tracker: tracker.clone(),
        fetcher: Arc::new(fetcher),
        uploader: Arc::new(uploader),
        resolver: Arc::new(SystemResolver),
        gate: gate.clone(),
        check_schedule: Arc::new(CheckSchedule::new(config.environment.check_interval)),
        config: config.clone(),
    }));

    let worker = Worker::new(
        engine,
        tracker,
        config.downloader.clone(),
        config.project.version.clone(),
        config.concurrent_items,
        config.tracker.poll_interval,
    )
    .with_upload_gate(gate);

    run_with_shutdown(&worker).await?;
    Ok(())
}

fn cmd_expand(item: &str) -> anyhow::Result<()> {
    let (item_type, value) = item
        .split_once(':')
        .with_context(|| format!("item name {item:?} has no ':'"))?;
    for target in archive_worker::expand(item_type, value)? {
        println!("{target}");
    }
    Ok(())
}

async fn cmd_check_environment(config: &Config) -> anyhow::Result<()> {
    let check = EnvironmentCheck::from_config(
        &config.environment,
        Arc::new(SystemResolver),
        Arc::new(CheckSchedule::new(0)),
    );
    let addresses = check.check().await?;
    for (host, ip) in config.environment.reference_hosts.iter().zip(&addresses) {
        println!("{host}\t{ip}");
    }
    println!("ok: {} distinct addresses", addresses.len());
    Ok(())
}
