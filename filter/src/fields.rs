//! Field names available to filter expressions.
//!
//! Built-in fields read the event header and the fixed part of the decoded
//! payload. Any other name refers to a plugin specific payload field.

use lookout_shared::types::events::{Event, FieldValue};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// `evt.num`
    Num,
    /// `evt.ts`
    Timestamp,
    /// `evt.plugin`
    Plugin,
    /// `evt.name`
    Name,
    /// `proc.pid`
    Pid,
    /// `thread.tid`
    Tid,
    /// `proc.name`
    Comm,
    /// Plugin payload field, by name
    Payload(String),
}

/// A field value borrowed from an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    Num(i128),
    Str(&'a str),
}

impl Field {
    /// Parse a field name. Returns `None` if `name` is not a valid identifier.
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "evt.num" => Field::Num,
            "evt.ts" => Field::Timestamp,
            "evt.plugin" => Field::Plugin,
            "evt.name" => Field::Name,
            "proc.pid" => Field::Pid,
            "thread.tid" => Field::Tid,
            "proc.name" => Field::Comm,
            other => {
                let payload = other.strip_prefix("fields.").unwrap_or(other);
                let mut chars = payload.chars();
                let valid_start = chars
                    .next()
                    .map(|c| c.is_ascii_alphabetic() || c == '_')
                    .unwrap_or(false);
                if !valid_start
                    || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
                {
                    return None;
                }
                Field::Payload(payload.to_string())
            }
        };
        Some(field)
    }

    /// Read this field from `event`. `None` if the event does not carry it.
    pub fn resolve<'a>(&self, event: &'a Event) -> Option<Resolved<'a>> {
        match self {
            Field::Num => Some(Resolved::Num(event.num as i128)),
            Field::Timestamp => Some(Resolved::Num(event.timestamp as i128)),
            Field::Plugin => Some(Resolved::Num(event.plugin_id as i128)),
            Field::Name => Some(Resolved::Str(&event.data.name)),
            Field::Pid => Some(Resolved::Num(event.data.pid as i128)),
            Field::Tid => Some(Resolved::Num(event.data.tid as i128)),
            Field::Comm => Some(Resolved::Str(&event.data.comm)),
            Field::Payload(name) => event.field(name).map(|value| match value {
                FieldValue::Str(s) => Resolved::Str(s),
                // Bool, Int and Uint all have a numeric view
                other => Resolved::Num(other.as_i128().unwrap_or_default()),
            }),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Num => f.write_str("evt.num"),
            Field::Timestamp => f.write_str("evt.ts"),
            Field::Plugin => f.write_str("evt.plugin"),
            Field::Name => f.write_str("evt.name"),
            Field::Pid => f.write_str("proc.pid"),
            Field::Tid => f.write_str("thread.tid"),
            Field::Comm => f.write_str("proc.name"),
            Field::Payload(name) => f.write_str(name),
        }
    }
}
