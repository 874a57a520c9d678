//! JSON lines event source
//!
//! Reads one event record per line and encodes it into a [`RawEvent`] the
//! processor can dispatch. Blank lines and `#` comments are skipped; lines
//! that cannot be turned into an event are logged and skipped.

use anyhow::{Context, Result};
use lookout_shared::protocol::wire::encode_payload;
use lookout_shared::types::events::{EventData, FieldValue, Pid, PluginId, RawEvent, Tid};
use lookout_shared::utils::time::system_time_nanos;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// One input line
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InputRecord {
    /// Event number; assigned sequentially when absent
    pub num: Option<u64>,
    /// Timestamp in nanoseconds; the read time when absent
    pub ts: Option<u64>,
    pub plugin_id: PluginId,
    pub name: String,
    pub pid: Pid,
    pub tid: Tid,
    pub comm: String,
    pub fields: Map<String, Value>,
}

impl InputRecord {
    /// Encode into a raw event, filling in `num` and `ts` when missing.
    pub fn into_raw(self, default_num: u64) -> Result<RawEvent> {
        let num = self.num.unwrap_or(default_num);

        let mut data = EventData {
            name: self.name,
            pid: self.pid,
            tid: self.tid,
            comm: self.comm,
            ..Default::default()
        };
        for (key, value) in self.fields {
            match json_to_field(value) {
                Some(v) => {
                    data.fields.insert(key, v);
                }
                None => debug!(num, field = %key, "dropping null field"),
            }
        }

        let payload = encode_payload(&data)
            .with_context(|| format!("Failed to encode payload of event {}", num))?;

        Ok(RawEvent {
            num,
            timestamp: self.ts.unwrap_or_else(system_time_nanos),
            plugin_id: self.plugin_id,
            payload,
        })
    }
}

/// Map a JSON value onto a payload field. `null` has no field representation.
fn json_to_field(value: Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Bool(b)),
        Value::Number(n) => Some(if let Some(i) = n.as_i64() {
            FieldValue::Int(i)
        } else if let Some(u) = n.as_u64() {
            FieldValue::Uint(u)
        } else {
            FieldValue::Str(n.to_string())
        }),
        Value::String(s) => Some(FieldValue::Str(s)),
        other => Some(FieldValue::Str(other.to_string())),
    }
}

/// Event source reading JSON lines from any buffered async reader
pub struct JsonLinesSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    next_num: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            next_num: 0,
            skipped: 0,
        }
    }

    /// Next event, or `None` at end of input.
    ///
    /// Lines that are not UTF-8, not a valid record, or too large to encode
    /// are logged and skipped. Only I/O errors end the stream early.
    pub async fn next_event(&mut self) -> Result<Option<RawEvent>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .context("Failed to read input")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(
                        line = self.line_no,
                        error = %e,
                        "skipping input line that is not UTF-8"
                    );
                    self.skipped += 1;
                    continue;
                }
            };
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let record = match serde_json::from_str::<InputRecord>(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "skipping malformed input line");
                    self.skipped += 1;
                    continue;
                }
            };

            match record.into_raw(self.next_num) {
                Ok(raw) => {
                    self.next_num = raw.num.wrapping_add(1);
                    return Ok(Some(raw));
                }
                Err(e) => {
                    warn!(
                        line = self.line_no,
                        error = %format!("{:#}", e),
                        "skipping event that cannot be encoded"
                    );
                    self.skipped += 1;
                }
            }
        }
    }

    /// Lines skipped because they could not be turned into an event
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_shared::protocol::wire::decode_payload;

    fn source(input: &'static str) -> JsonLinesSource<&'static [u8]> {
        JsonLinesSource::new(input.as_bytes())
    }

    #[tokio::test]
    async fn test_reads_records() {
        let mut src = source(
            r#"{"num": 7, "ts": 100, "plugin_id": 2, "name": "open", "pid": 10, "tid": 11, "comm": "cat", "fields": {"fd": 3, "path": "/etc/passwd", "ok": true}}
{"plugin_id": 2, "name": "close"}
"#,
        );

        let first = src.next_event().await.unwrap().unwrap();
        assert_eq!(first.num, 7);
        assert_eq!(first.timestamp, 100);
        assert_eq!(first.plugin_id, 2);
        let data = decode_payload(&first.payload).unwrap();
        assert_eq!(data.name, "open");
        assert_eq!(data.comm, "cat");
        assert_eq!(data.fields.get("fd"), Some(&FieldValue::Int(3)));
        assert_eq!(data.fields.get("ok"), Some(&FieldValue::Bool(true)));

        let second = src.next_event().await.unwrap().unwrap();
        assert_eq!(second.num, 8);
        assert!(second.timestamp > 0);

        assert!(src.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_comments_blanks_and_garbage() {
        let mut src = source("# header\n\nnot json\n{\"name\": \"x\"}\n");
        let event = src.next_event().await.unwrap().unwrap();
        assert_eq!(event.num, 0);
        assert_eq!(src.skipped(), 1);
        assert!(src.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_skips_line_that_is_not_utf8() {
        let input: &'static [u8] =
            b"{\"name\": \"open\"}\n{\"name\": \"op\xffen\"}\n{\"name\": \"close\"}\n";
        let mut src = JsonLinesSource::new(input);

        let first = src.next_event().await.unwrap().unwrap();
        assert_eq!(decode_payload(&first.payload).unwrap().name, "open");
        let second = src.next_event().await.unwrap().unwrap();
        assert_eq!(decode_payload(&second.payload).unwrap().name, "close");
        assert_eq!(second.num, 1);
        assert!(src.next_event().await.unwrap().is_none());
        assert_eq!(src.skipped(), 1);
    }

    #[tokio::test]
    async fn test_skips_record_too_large_to_encode() {
        let blob = "x".repeat(2 * 1024 * 1024);
        let input = format!(
            "{{\"num\": 0, \"name\": \"a\"}}\n{{\"num\": 1, \"fields\": {{\"blob\": \"{}\"}}}}\n{{\"num\": 2, \"name\": \"b\"}}\n",
            blob
        );
        let mut src = JsonLinesSource::new(input.as_bytes());

        assert_eq!(src.next_event().await.unwrap().unwrap().num, 0);
        assert_eq!(src.next_event().await.unwrap().unwrap().num, 2);
        assert!(src.next_event().await.unwrap().is_none());
        assert_eq!(src.skipped(), 1);
    }

    #[test]
    fn test_json_field_mapping() {
        assert_eq!(json_to_field(Value::Null), None);
        assert_eq!(
            json_to_field(serde_json::json!(u64::MAX)),
            Some(FieldValue::Uint(u64::MAX))
        );
        assert_eq!(
            json_to_field(serde_json::json!(-4)),
            Some(FieldValue::Int(-4))
        );
        assert_eq!(
            json_to_field(serde_json::json!(1.5)),
            Some(FieldValue::Str("1.5".to_string()))
        );
        assert_eq!(
            json_to_field(serde_json::json!([1, 2])),
            Some(FieldValue::Str("[1,2]".to_string()))
        );
    }
}
