//! Output sinks for matched events

pub mod json;

pub use json::JsonLinesSink;
