//! Event type definitions
//!
//! A [`RawEvent`] is what the event source hands to the processor: a small
//! header plus an opaque payload. Filter workers decode the payload into
//! their own [`Event`] and evaluate the compiled filter against it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp in nanoseconds since the UNIX epoch
pub type Timestamp = u64;

/// Numeric id of the plugin that produced an event
pub type PluginId = u32;

/// Process ID
pub type Pid = i32;

/// Thread ID
pub type Tid = i32;

/// Event as produced by the event source, before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Monotonic event number assigned by the source
    pub num: u64,

    /// Timestamp when the event was captured
    pub timestamp: Timestamp,

    /// Plugin that produced the event
    pub plugin_id: PluginId,

    /// Encoded [`EventData`] (see [`crate::protocol::wire`])
    pub payload: Vec<u8>,
}

/// A single payload field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(String),
}

impl FieldValue {
    /// Numeric view of the value, wide enough to hold both `i64` and `u64`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            FieldValue::Int(v) => Some(*v as i128),
            FieldValue::Uint(v) => Some(*v as i128),
            FieldValue::Bool(v) => Some(*v as i128),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// Decoded event payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    /// Event name as reported by the plugin (e.g. "open", "connect")
    pub name: String,

    /// Process ID
    pub pid: Pid,

    /// Thread ID
    pub tid: Tid,

    /// Process name (comm)
    pub comm: String,

    /// Plugin specific fields
    pub fields: BTreeMap<String, FieldValue>,
}

impl EventData {
    /// Builder-style helper for attaching a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// Fully decoded event, as seen by filters and returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub num: u64,
    pub timestamp: Timestamp,
    pub plugin_id: PluginId,
    pub data: EventData,
}

impl Event {
    /// Overwrite the header from `raw` and clear the payload, keeping the
    /// existing allocations for reuse.
    pub fn reset_from(&mut self, raw: &RawEvent) {
        self.num = raw.num;
        self.timestamp = raw.timestamp;
        self.plugin_id = raw.plugin_id;
        self.data.name.clear();
        self.data.comm.clear();
        self.data.fields.clear();
        self.data.pid = 0;
        self.data.tid = 0;
    }

    /// Look up a payload field by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.data.fields.get(name)
    }
}
