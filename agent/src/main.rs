//! Lookout agent
//!
//! Reads events as JSON lines, filters them through a pool of filter workers
//! and writes the matching events as JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use lookout_agent::config::{AgentConfig, LogConfig, LogFormat};
use lookout_agent::{metrics, run_agent};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lookout-agent")]
#[command(about = "Concurrent runtime event filter", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "LOOKOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Filter expression, e.g. "evt.name = open and proc.name != cat"
    #[arg(short, long)]
    filter: Option<String>,

    /// Input file with one JSON event per line (default: stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file for matched events (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of async filter workers (0 evaluates inline)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long)]
    metrics: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(filter) = &self.filter {
            config.filter = Some(filter.clone());
        }
        if let Some(workers) = self.workers {
            config.processor.workers = workers;
        }
        if self.metrics {
            config.metrics.dump_on_exit = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().map_err(|e| anyhow::anyhow!("{}", e))?;

    let args = Args::parse();

    let mut config =
        AgentConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    init_tracing(&config.log, args.verbose)?;

    info!("Starting Lookout agent");
    debug!("Configuration: {:?}", config);

    let result = run_agent(&config, args.input, args.output).await;

    if config.metrics.dump_on_exit {
        eprint!("{}", metrics::encode_metrics());
    }

    result.map(|_| ())
}

/// Initialize tracing/logging
fn init_tracing(log: &LogConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { log.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = match &log.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(log.file.is_none())
        .with_writer(writer);

    match log.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init(),
    }

    Ok(())
}
