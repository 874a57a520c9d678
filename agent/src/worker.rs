//! Filter workers
//!
//! A worker owns one evaluation slot: a private [`Event`] plus the byte
//! storage backing its payload, both reused across assignments. Its
//! lifecycle is a strict cycle:
//!
//! ```text
//! Ready ──assign──▶ Working ──evaluate──▶ HasResult ──take_result──▶ Ready
//! ```
//!
//! Synchronous workers evaluate on the caller's thread. Asynchronous workers
//! own a background thread that parks on a condition variable until an event
//! is assigned, evaluates it, publishes `HasResult` and parks again. Dropping
//! a worker sets its `die` flag, wakes the thread and joins it.

use crate::error::ProcessorError;
use crate::metrics;
use crate::processor::Verdict;
use lookout_filter::EventFilter;
use lookout_shared::protocol::wire::decode_payload;
use lookout_shared::types::events::{Event, RawEvent};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Ready = 0,
    Working = 1,
    HasResult = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Ready,
            1 => WorkerState::Working,
            2 => WorkerState::HasResult,
            other => unreachable!("invalid worker state {}", other),
        }
    }

    /// The only state this one may move to
    pub fn next(self) -> Self {
        match self {
            WorkerState::Ready => WorkerState::Working,
            WorkerState::Working => WorkerState::HasResult,
            WorkerState::HasResult => WorkerState::Ready,
        }
    }
}

/// Private event and its backing storage
#[derive(Debug, Default)]
struct EventSlot {
    event: Event,
    storage: Vec<u8>,
    matched: bool,
}

impl EventSlot {
    fn load(&mut self, raw: &RawEvent) {
        self.event.reset_from(raw);
        self.storage.clear();
        self.storage.extend_from_slice(&raw.payload);
        self.matched = false;
    }

    /// Decode the stored payload and run the filter. Decode failures and
    /// panicking filters count as "no match".
    fn evaluate(&mut self, filter: &dyn EventFilter) -> bool {
        let started = Instant::now();

        let matched = match decode_payload(&self.storage) {
            Ok(data) => {
                self.event.data = data;
                let event = &self.event;
                match panic::catch_unwind(AssertUnwindSafe(|| filter.matches(event))) {
                    Ok(matched) => matched,
                    Err(_) => {
                        warn!(num = event.num, "filter panicked, treating event as no match");
                        metrics::FILTER_PANICS.inc();
                        false
                    }
                }
            }
            Err(e) => {
                debug!(
                    num = self.event.num,
                    error = %e,
                    "payload decode failed, treating event as no match"
                );
                metrics::DECODE_FAILURES.inc();
                false
            }
        };

        metrics::EVAL_DURATION.observe(started.elapsed().as_secs_f64());
        self.matched = matched;
        matched
    }
}

/// State shared between the orchestrator and a worker's background thread.
///
/// `state` is published atomically so polling never has to take the slot
/// lock while an evaluation is running.
#[derive(Debug, Default)]
struct WorkerShared {
    state: AtomicU8,
    die: AtomicBool,
    slot: Mutex<EventSlot>,
    wake: Condvar,
    evaluations: AtomicU64,
    matches: AtomicU64,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from` to its successor. Transitions never skip a state.
    fn advance(&self, from: WorkerState) -> bool {
        self.state
            .compare_exchange(
                from as u8,
                from.next() as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn lock_slot(&self) -> MutexGuard<'_, EventSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, matched: bool) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.matches.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// One evaluation slot of the processor's pool.
pub struct FilterWorker {
    id: usize,
    asynchronous: bool,
    filter: Arc<dyn EventFilter>,
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for FilterWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterWorker")
            .field("id", &self.id)
            .field("async", &self.is_async())
            .field("state", &self.state())
            .finish()
    }
}

impl FilterWorker {
    /// Create a worker that evaluates on the caller's thread.
    pub fn new_sync(id: usize, filter: Arc<dyn EventFilter>) -> Self {
        Self {
            id,
            asynchronous: false,
            filter,
            shared: Arc::new(WorkerShared::default()),
            thread: None,
        }
    }

    /// Create a worker with its own background evaluation thread.
    pub fn spawn(id: usize, filter: Arc<dyn EventFilter>) -> Result<Self, ProcessorError> {
        let shared = Arc::new(WorkerShared::default());
        let thread = std::thread::Builder::new()
            .name(format!("lookout-filter-{}", id))
            .spawn({
                let shared = shared.clone();
                let filter = filter.clone();
                move || worker_loop(id, shared, filter)
            })
            .map_err(|source| ProcessorError::Spawn { id, source })?;

        debug!(worker = id, "filter worker started");
        Ok(Self {
            id,
            asynchronous: true,
            filter,
            shared,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Number of events this worker has evaluated
    pub fn evaluations(&self) -> u64 {
        self.shared.evaluations.load(Ordering::Relaxed)
    }

    /// Number of evaluated events that matched
    pub fn matches(&self) -> u64 {
        self.shared.matches.load(Ordering::Relaxed)
    }

    /// Copy `raw` into the worker's private slot and move it to `Working`.
    /// Asynchronous workers are woken to evaluate it.
    pub fn assign(&self, raw: &RawEvent) -> Result<(), ProcessorError> {
        let mut slot = self.shared.lock_slot();
        let state = self.shared.state();
        if state != WorkerState::Ready {
            return Err(ProcessorError::WorkerBusy { id: self.id, state });
        }
        slot.load(raw);
        self.shared.advance(WorkerState::Ready);
        drop(slot);

        if self.is_async() {
            self.shared.wake.notify_one();
        }
        trace!(worker = self.id, num = raw.num, "event assigned");
        Ok(())
    }

    /// Evaluate the assigned event on the calling thread and return whether
    /// it matched. Only valid for synchronous workers in state `Working`.
    pub fn process_event(&self) -> bool {
        debug_assert!(!self.is_async(), "process_event called on async worker");
        debug_assert_eq!(self.state(), WorkerState::Working);

        let mut slot = self.shared.lock_slot();
        if self.shared.state() != WorkerState::Working {
            return false;
        }
        let matched = slot.evaluate(self.filter.as_ref());
        self.shared.record(matched);
        self.shared.advance(WorkerState::Working);
        matched
    }

    /// Non-blocking: if the worker has a result, hand it out and return the
    /// worker to `Ready`. Otherwise report `Pending`.
    pub fn take_result(&self) -> Verdict {
        if self.shared.state() != WorkerState::HasResult {
            return Verdict::Pending;
        }

        let slot = self.shared.lock_slot();
        let verdict = if slot.matched {
            Verdict::Matched(slot.event.clone())
        } else {
            Verdict::Filtered
        };
        self.shared.advance(WorkerState::HasResult);
        verdict
    }

    /// Stop the background thread (if any) and wait for it to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        {
            let _slot = self.shared.lock_slot();
            self.shared.die.store(true, Ordering::Release);
            self.shared.wake.notify_all();
        }
        if handle.join().is_err() {
            warn!(worker = self.id, "filter worker thread panicked");
        }
        debug!(worker = self.id, "filter worker stopped");
    }
}

impl Drop for FilterWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, shared: Arc<WorkerShared>, filter: Arc<dyn EventFilter>) {
    let mut slot = shared.lock_slot();
    loop {
        while !shared.die.load(Ordering::Acquire) && shared.state() != WorkerState::Working {
            slot = shared
                .wake
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if shared.die.load(Ordering::Acquire) {
            break;
        }

        let matched = slot.evaluate(filter.as_ref());
        shared.record(matched);
        shared.advance(WorkerState::Working);
        trace!(worker = id, num = slot.event.num, matched, "event evaluated");
    }
    trace!(worker = id, "filter worker exiting");
}
