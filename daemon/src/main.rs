//! blockfeed daemon: entry point for running the block importer.

use anyhow::Context;
use blockfeed_importer::{
    init_logging, provider_from_config, Collaborators, Importer, ImporterConfig, LogFormat,
    LoggingNotifier, NodeConfig, ShutdownController,
};
use blockfeed_store::{MemoryLedgerStore, MemoryRecordStore};
use blockfeed_types::SystemClock;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "blockfeed-daemon", about = "Verified block ingestion daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "BLOCKFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Network name, the top-level folder in object storage.
    #[arg(long, env = "BLOCKFEED_NETWORK")]
    network: Option<String>,

    /// Block source: "auto", "block_node" or "file".
    #[arg(long, env = "BLOCKFEED_SOURCE_TYPE")]
    source_type: Option<String>,

    /// Block nodes (comma-separated: "host:port,host:port"), all at priority 0.
    #[arg(long, env = "BLOCKFEED_NODES", value_delimiter = ',')]
    nodes: Vec<String>,

    /// First block to import when nothing has been verified yet.
    #[arg(long, env = "BLOCKFEED_START_BLOCK")]
    start_block: Option<u64>,

    /// Last block to import, inclusive.
    #[arg(long, env = "BLOCKFEED_END_BLOCK")]
    end_block: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BLOCKFEED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "BLOCKFEED_LOG_FORMAT")]
    log_format: Option<String>,

    /// Print Prometheus metrics on exit.
    #[arg(long, env = "BLOCKFEED_ENABLE_METRICS")]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Import blocks until interrupted.
    Run,
    /// Print the block range each configured node serves.
    Status,
}

fn parse_node(s: &str) -> anyhow::Result<NodeConfig> {
    let (host, port) = s
        .rsplit_once(':')
        .with_context(|| format!("block node '{s}' is not host:port"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in block node '{s}'"))?;
    Ok(NodeConfig {
        host: host.to_string(),
        port,
        priority: 0,
    })
}

/// File settings first, then CLI flags and env vars on top.
fn load_config(cli: &Cli) -> anyhow::Result<ImporterConfig> {
    let mut config = match &cli.config {
        Some(path) => ImporterConfig::from_toml_file(&path.to_string_lossy())
            .with_context(|| format!("failed to load config file {}", path.display()))?,
        None => ImporterConfig::default(),
    };

    if let Some(network) = &cli.network {
        config.network = network.clone();
    }
    if let Some(source_type) = &cli.source_type {
        config.block.source_type = source_type.parse().map_err(anyhow::Error::msg)?;
    }
    if !cli.nodes.is_empty() {
        config.block.nodes = cli
            .nodes
            .iter()
            .map(|n| parse_node(n))
            .collect::<anyhow::Result<_>>()?;
    }
    if cli.start_block.is_some() {
        config.start_block_number = cli.start_block;
    }
    if cli.end_block.is_some() {
        config.end_block_number = cli.end_block;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    config.enable_metrics |= cli.metrics;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format: LogFormat = config.log_format.parse().map_err(anyhow::Error::msg)?;
    init_logging(format, &config.log_level);
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    let collaborators = Collaborators {
        record_store: Arc::new(MemoryRecordStore::new()),
        ledger_store: Arc::new(MemoryLedgerStore::new()),
        provider: provider_from_config(&config.block.bucket)?,
        notifier: Arc::new(LoggingNotifier),
        clock: Arc::new(SystemClock),
    };
    let enable_metrics = config.enable_metrics;
    let importer = Importer::from_config(config, collaborators)?;

    match cli.command {
        Command::Status => {
            for status in importer.node_status().await {
                match status.range {
                    Some(range) => println!(
                        "{}: blocks {} to {}",
                        status.endpoint, range.first_available_block, range.last_available_block
                    ),
                    None => println!("{}: unavailable", status.endpoint),
                }
            }
        }
        Command::Run => {
            let config = importer.config();
            tracing::info!(
                "Starting blockfeed importer on {} (source: {}, nodes: {})",
                config.network,
                config.block.source_type,
                config.block.nodes.len()
            );

            let shutdown = Arc::new(ShutdownController::new());
            let signals = {
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move { shutdown.wait_for_signal().await })
            };
            let result = importer.run(&shutdown).await;
            signals.abort();

            if enable_metrics {
                print!("{}", importer.metrics().encode());
            }
            result?;
            tracing::info!("blockfeed daemon exited cleanly");
        }
    }

    Ok(())
}
