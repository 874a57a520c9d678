//! Error types for the event processor

use crate::worker::WorkerState;
use lookout_filter::CompileError;
use lookout_shared::types::events::PluginId;

/// Errors returned by [`crate::processor::EventProcessor`].
///
/// Apart from `Compile` and `Spawn`, every variant is a lifecycle violation:
/// the caller broke the one-event-in-flight discipline.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("no filter compiled, call compile() before processing events")]
    NotCompiled,

    #[error("event {num} is still in flight, drain the backlog first")]
    EventInFlight { num: u64 },

    #[error("no event in flight")]
    NothingInFlight,

    #[error("worker {id} cannot accept an event in state {state:?}")]
    WorkerBusy { id: usize, state: WorkerState },

    #[error("failed to spawn filter worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while registering plugin sources
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin id {0} is already registered")]
    Duplicate(PluginId),
}
