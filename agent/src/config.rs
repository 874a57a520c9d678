//! Configuration types for the filtering agent
//!
//! Settings come from an optional TOML file, then `LOOKOUT_*` environment
//! variables (nested keys separated by `__`, e.g. `LOOKOUT_PROCESSOR__WORKERS`),
//! then command-line flags applied by the binary.

use anyhow::Context;
use lookout_shared::types::plugin::PluginSourceInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Upper bound on async filter workers
pub const MAX_WORKERS: usize = 64;

/// Event processor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Number of async filter workers. 0 evaluates every event on the
    /// calling thread through the synchronous worker.
    pub workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers > MAX_WORKERS {
            anyhow::bail!("Too many filter workers: {} (max {})", self.workers, MAX_WORKERS);
        }

        let cpus = num_cpus::get();
        if self.workers > cpus {
            warn!(
                "{} filter workers configured on a machine with {} CPUs",
                self.workers, cpus
            );
        }
        Ok(())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level directive, overridden by `RUST_LOG`
    pub level: String,

    pub format: LogFormat,

    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Print Prometheus metrics to stderr when the agent exits
    pub dump_on_exit: bool,
}

/// Agent configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Filter expression applied to every event
    pub filter: Option<String>,

    pub processor: ProcessorConfig,

    /// Plugin sources registered before filtering starts
    pub plugins: Vec<PluginSourceInfo>,

    pub log: LogConfig,

    pub metrics: MetricsConfig,
}

impl AgentConfig {
    /// Load configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("LOOKOUT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.processor.validate()?;

        if let Some(filter) = &self.filter {
            if filter.trim().is_empty() {
                anyhow::bail!("Filter expression must not be empty");
            }
        }

        let mut ids: Vec<_> = self.plugins.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
            anyhow::bail!("Plugin id {} is configured more than once", dup[0]);
        }

        Ok(())
    }
}
