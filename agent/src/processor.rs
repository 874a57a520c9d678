//! Event processor: the filtering pipeline orchestrator.
//!
//! The processor owns a pool of asynchronous [`FilterWorker`]s, one
//! synchronous worker, the plugin source registry and the bookkeeping for the
//! event currently in flight.
//!
//! At most one event is in flight at a time. `process_event` hands the event
//! to the first `Ready` pool worker (lowest index) and returns
//! [`Verdict::Pending`]; the caller does other work and later drains the
//! result with `get_event_from_backlog`. When no pool worker is `Ready`
//! (a pool of size 0) the synchronous worker evaluates the event inline.
//! Because nothing is dispatched until the previous event has been drained,
//! results always come back in submission order.

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::metrics;
use crate::registry::PluginSourceRegistry;
use crate::worker::{FilterWorker, WorkerState};
use lookout_filter::{EventFilter, ExpressionCompiler, FilterCompiler};
use lookout_shared::types::events::{Event, PluginId, RawEvent};
use lookout_shared::types::plugin::PluginSourceInfo;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Outcome of submitting or draining an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The event matched the filter
    Matched(Event),
    /// The event was evaluated and discarded
    Filtered,
    /// The event is still being evaluated by an async worker
    Pending,
}

impl Verdict {
    /// The matched event, or `None` for filtered and pending events
    pub fn into_event(self) -> Option<Event> {
        match self {
            Verdict::Matched(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Verdict::Pending)
    }
}

/// Counters kept by a processor since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    /// Events handed to async workers
    pub dispatched: u64,
    /// Events evaluated inline by the synchronous worker
    pub evaluated_sync: u64,
    pub matched: u64,
    pub filtered: u64,
}

/// The event currently owned by an async worker
#[derive(Debug, Clone, Copy)]
struct InFlight {
    worker: usize,
    num: u64,
    plugin_id: PluginId,
}

pub struct EventProcessor {
    config: ProcessorConfig,
    compiler: Arc<dyn FilterCompiler>,
    filter: Option<Arc<dyn EventFilter>>,
    workers: Vec<FilterWorker>,
    sync_worker: Option<FilterWorker>,
    registry: PluginSourceRegistry,
    in_flight: Option<InFlight>,
    in_progress_sources: BTreeMap<PluginId, Arc<PluginSourceInfo>>,
    current_source: Option<Arc<PluginSourceInfo>>,
    stats: ProcessorStats,
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("config", &self.config)
            .field("compiled", &self.filter.is_some())
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight)
            .field("stats", &self.stats)
            .finish()
    }
}

impl EventProcessor {
    /// Create a processor using the built-in expression compiler.
    pub fn new(config: ProcessorConfig, registry: PluginSourceRegistry) -> Self {
        Self::with_compiler(config, registry, Arc::new(ExpressionCompiler))
    }

    /// Create a processor with a custom filter compiler.
    pub fn with_compiler(
        config: ProcessorConfig,
        registry: PluginSourceRegistry,
        compiler: Arc<dyn FilterCompiler>,
    ) -> Self {
        Self {
            config,
            compiler,
            filter: None,
            workers: Vec::new(),
            sync_worker: None,
            registry,
            in_flight: None,
            in_progress_sources: BTreeMap::new(),
            current_source: None,
            stats: ProcessorStats::default(),
        }
    }

    /// Compile `expression` and rebuild the worker pool around it.
    ///
    /// On error the previously compiled filter (if any) stays in place.
    pub fn compile(&mut self, expression: &str) -> Result<(), ProcessorError> {
        if let Some(flight) = &self.in_flight {
            return Err(ProcessorError::EventInFlight { num: flight.num });
        }

        let filter = self.compiler.compile(expression)?;

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            workers.push(FilterWorker::spawn(id, filter.clone())?);
        }

        // Replacing the old pool joins its threads
        self.workers = workers;
        self.sync_worker = Some(FilterWorker::new_sync(self.config.workers, filter.clone()));
        self.filter = Some(filter);

        info!(workers = self.config.workers, expression, "filter compiled");
        Ok(())
    }

    /// Submit one event.
    ///
    /// Returns [`Verdict::Pending`] when the event was handed to an async
    /// worker; the result must then be drained with
    /// [`get_event_from_backlog`](Self::get_event_from_backlog) before the
    /// next submission. Otherwise the event was evaluated inline.
    pub fn process_event(&mut self, raw: &RawEvent) -> Result<Verdict, ProcessorError> {
        if self.filter.is_none() {
            return Err(ProcessorError::NotCompiled);
        }
        if let Some(flight) = &self.in_flight {
            return Err(ProcessorError::EventInFlight { num: flight.num });
        }

        let source = self.registry.get(raw.plugin_id).cloned();
        if source.is_none() {
            debug!(
                plugin_id = raw.plugin_id,
                num = raw.num,
                "event from unregistered plugin"
            );
        }
        self.current_source = source.clone();

        if let Some(idx) = self.is_worker_available() {
            self.prepare_worker(idx, raw)?;
            if let Some(info) = source {
                self.in_progress_sources.insert(raw.plugin_id, info);
            }
            self.in_flight = Some(InFlight {
                worker: idx,
                num: raw.num,
                plugin_id: raw.plugin_id,
            });
            self.stats.dispatched += 1;
            metrics::EVENTS_PROCESSED.with_label_values(&["async"]).inc();
            trace!(worker = idx, num = raw.num, "event dispatched");
            return Ok(Verdict::Pending);
        }

        let sync = self.sync_worker.as_ref().ok_or(ProcessorError::NotCompiled)?;
        sync.assign(raw)?;
        sync.process_event();
        let verdict = sync.take_result();
        self.stats.evaluated_sync += 1;
        metrics::EVENTS_PROCESSED.with_label_values(&["sync"]).inc();
        self.record(&verdict);
        Ok(verdict)
    }

    /// Poll the in-flight event. Never blocks.
    ///
    /// Returns [`Verdict::Pending`] while the worker is still evaluating; the
    /// in-flight event is released once a final verdict is returned.
    pub fn get_event_from_backlog(&mut self) -> Result<Verdict, ProcessorError> {
        let flight = self.in_flight.ok_or(ProcessorError::NothingInFlight)?;

        let verdict = self.workers[flight.worker].take_result();
        if verdict.is_pending() {
            return Ok(verdict);
        }

        self.in_progress_sources.remove(&flight.plugin_id);
        self.in_flight = None;
        self.record(&verdict);
        trace!(worker = flight.worker, num = flight.num, "event drained");
        Ok(verdict)
    }

    /// Descriptor registered for `id`, `None` for unknown plugins.
    pub fn get_plugin_source_info(&self, id: PluginId) -> Option<Arc<PluginSourceInfo>> {
        self.registry.get(id).cloned()
    }

    /// Descriptor of the most recently submitted event's plugin
    pub fn current_source(&self) -> Option<&Arc<PluginSourceInfo>> {
        self.current_source.as_ref()
    }

    /// Descriptor for `id` if an event from that plugin is in flight
    pub fn in_progress_source(&self, id: PluginId) -> Option<&Arc<PluginSourceInfo>> {
        self.in_progress_sources.get(&id)
    }

    /// True while a dispatched event has not been drained
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_compiled(&self) -> bool {
        self.filter.is_some()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn registry(&self) -> &PluginSourceRegistry {
        &self.registry
    }

    /// States of the pool workers, by index
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(FilterWorker::state).collect()
    }

    /// Index of the first `Ready` pool worker
    fn is_worker_available(&self) -> Option<usize> {
        self.workers
            .iter()
            .position(|w| w.state() == WorkerState::Ready)
    }

    fn prepare_worker(&self, idx: usize, raw: &RawEvent) -> Result<(), ProcessorError> {
        self.workers[idx].assign(raw)
    }

    fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Matched(_) => {
                self.stats.matched += 1;
                metrics::EVENTS_MATCHED.inc();
            }
            Verdict::Filtered => {
                self.stats.filtered += 1;
                metrics::EVENTS_FILTERED.inc();
            }
            Verdict::Pending => {}
        }
    }

    /// Stop and join every worker thread. Any in-flight event is dropped and
    /// the processor must be compiled again before further use.
    pub fn shutdown(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            debug!(num = flight.num, "dropping in-flight event on shutdown");
            self.in_progress_sources.remove(&flight.plugin_id);
        }
        for worker in &mut self.workers {
            worker.shutdown();
        }
        self.workers.clear();
        self.sync_worker = None;
        self.filter = None;
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
