//! Shared types and utilities for Lookout
//!
//! This crate contains the event data model, plugin source descriptors and the
//! payload codec used by the filter compiler and the event processor.

pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{events::*, plugin::*};
