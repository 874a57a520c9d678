//! Lookout agent library
//!
//! Concurrent event filtering: a pool of filter workers evaluates a
//! compiled filter against incoming events while the caller keeps reading
//! input, and matched events come back in submission order.

pub mod config;
pub mod error;
pub mod metrics;
pub mod output;
pub mod processor;
pub mod registry;
pub mod source;
pub mod worker;

pub use config::AgentConfig;
pub use error::{ProcessorError, RegistryError};
pub use processor::{EventProcessor, ProcessorStats, Verdict};
pub use registry::PluginSourceRegistry;

use anyhow::{Context, Result};
use output::JsonLinesSink;
use serde::Serialize;
use source::JsonLinesSource;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader, BufWriter};
use tracing::{debug, info};

/// Polls that yield to the runtime before the drain loop starts sleeping.
const DRAIN_SPINS: u32 = 64;
const DRAIN_BACKOFF: Duration = Duration::from_micros(50);

/// Totals for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    /// Events read from the source
    pub events: u64,
    /// Events written to the sink
    pub matched: u64,
    /// Input lines skipped as malformed
    pub skipped: u64,
    pub stats: ProcessorStats,
}

/// Feed every event from `source` through `processor` and write matches to
/// `sink`.
///
/// While an async worker evaluates an event, the next one is read from the
/// source. The backlog is drained before the next submission, so output
/// order follows input order.
pub async fn run_pipeline<R, W>(
    processor: &mut EventProcessor,
    source: &mut JsonLinesSource<R>,
    sink: &mut JsonLinesSink<W>,
) -> Result<PipelineSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = PipelineSummary::default();
    let mut next = source.next_event().await?;

    while let Some(raw) = next.take() {
        summary.events += 1;
        let verdict = processor
            .process_event(&raw)
            .with_context(|| format!("Failed to submit event {}", raw.num))?;

        next = source.next_event().await?;

        let verdict = if verdict.is_pending() {
            drain(processor).await?
        } else {
            verdict
        };

        if let Verdict::Matched(event) = verdict {
            let info = processor.get_plugin_source_info(event.plugin_id);
            sink.write_event(&event, info.as_deref()).await?;
            summary.matched += 1;
        }
    }

    sink.flush().await?;
    summary.skipped = source.skipped();
    summary.stats = processor.stats();
    Ok(summary)
}

/// Poll the backlog until the in-flight event has a verdict.
async fn drain(processor: &mut EventProcessor) -> Result<Verdict> {
    let mut polls = 0u32;
    loop {
        let verdict = processor.get_event_from_backlog()?;
        if !verdict.is_pending() {
            return Ok(verdict);
        }
        if polls < DRAIN_SPINS {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(DRAIN_BACKOFF).await;
        }
        polls = polls.saturating_add(1);
    }
}

/// Build a processor from `config` and run it over `input` (stdin when
/// `None`), writing matches to `output` (stdout when `None`).
pub async fn run_agent(
    config: &AgentConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<PipelineSummary> {
    config.validate().context("Invalid configuration")?;

    let expression = config
        .filter
        .as_deref()
        .context("No filter expression configured")?;

    let registry = PluginSourceRegistry::from_sources(config.plugins.iter().cloned())
        .context("Failed to register plugin sources")?;
    info!(plugins = registry.len(), "plugin sources registered");

    let mut processor = EventProcessor::new(config.processor.clone(), registry);
    processor
        .compile(expression)
        .context("Failed to compile filter")?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(tokio::io::stdout())),
    };

    let mut source = JsonLinesSource::new(reader);
    let mut sink = JsonLinesSink::new(writer);

    info!(workers = config.processor.workers, "filtering events");
    let summary = run_pipeline(&mut processor, &mut source, &mut sink).await?;
    debug!(?summary, "pipeline finished");

    info!(
        events = summary.events,
        matched = summary.matched,
        skipped = summary.skipped,
        "filtering complete"
    );
    Ok(summary)
}
