//! Plugin source descriptors
//!
//! Every source plugin registers one descriptor at setup time. The event
//! processor looks descriptors up by plugin id to attribute in-flight events.

use crate::types::events::PluginId;
use serde::{Deserialize, Serialize};

/// Descriptor of a registered source plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSourceInfo {
    /// Stable numeric plugin id
    pub id: PluginId,

    /// Plugin name
    pub name: String,

    /// Name of the event source the plugin feeds (e.g. "aws_cloudtrail")
    #[serde(default)]
    pub event_source: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: String,
}

impl PluginSourceInfo {
    pub fn new(id: PluginId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            event_source: String::new(),
            version: String::new(),
            description: String::new(),
        }
    }
}
