//! JSON output
//!
//! Writes matched events as JSON lines, one object per event, in the order
//! they are handed in.

use anyhow::{Context, Result};
use lookout_shared::types::events::{Event, FieldValue, Pid, PluginId, Tid, Timestamp};
use lookout_shared::types::plugin::PluginSourceInfo;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Serialized form of one matched event
#[derive(Debug, Serialize)]
pub struct OutputRecord<'a> {
    pub num: u64,
    pub ts: Timestamp,
    pub plugin_id: PluginId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'a str>,
    pub name: &'a str,
    pub pid: Pid,
    pub tid: Tid,
    pub comm: &'a str,
    pub fields: BTreeMap<&'a str, Value>,
}

impl<'a> OutputRecord<'a> {
    pub fn new(event: &'a Event, source: Option<&'a PluginSourceInfo>) -> Self {
        Self {
            num: event.num,
            ts: event.timestamp,
            plugin_id: event.plugin_id,
            source: source.map(|s| s.name.as_str()),
            name: &event.data.name,
            pid: event.data.pid,
            tid: event.data.tid,
            comm: &event.data.comm,
            fields: event
                .data
                .fields
                .iter()
                .map(|(k, v)| (k.as_str(), field_to_json(v)))
                .collect(),
        }
    }
}

fn field_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::Uint(u) => Value::from(*u),
        FieldValue::Str(s) => Value::String(s.clone()),
    }
}

/// Sink writing matched events as JSON lines
pub struct JsonLinesSink<W> {
    writer: W,
    written: u64,
}

impl<W: AsyncWrite + Unpin> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Append one event.
    pub async fn write_event(
        &mut self,
        event: &Event,
        source: Option<&PluginSourceInfo>,
    ) -> Result<()> {
        let mut line = serde_json::to_vec(&OutputRecord::new(event, source))
            .with_context(|| format!("Failed to serialize event {}", event.num))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .context("Failed to write output")?;
        self.written += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await.context("Failed to flush output")
    }

    /// Number of events written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_shared::types::events::EventData;

    #[tokio::test]
    async fn test_write_json_lines() {
        let event = Event {
            num: 4,
            timestamp: 99,
            plugin_id: 1,
            data: EventData {
                name: "open".to_string(),
                pid: 10,
                tid: 11,
                comm: "cat".to_string(),
                ..Default::default()
            }
            .with_field("fd", 3i64)
            .with_field("path", "/tmp/x"),
        };
        let info = PluginSourceInfo::new(1, "syscall");

        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_event(&event, Some(&info)).await.unwrap();
        sink.write_event(&event, None).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["num"], 4);
        assert_eq!(first["source"], "syscall");
        assert_eq!(first["fields"]["fd"], 3);
        assert_eq!(first["fields"]["path"], "/tmp/x");

        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert!(second.get("source").is_none());
    }
}
