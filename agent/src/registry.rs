//! Plugin source registry
//!
//! Maps plugin ids to their source descriptors. Populated once at setup,
//! then owned read-only by the event processor.

use crate::error::RegistryError;
use lookout_shared::types::events::PluginId;
use lookout_shared::types::plugin::PluginSourceInfo;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct PluginSourceRegistry {
    sources: BTreeMap<PluginId, Arc<PluginSourceInfo>>,
}

impl PluginSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of descriptors. Fails on the first
    /// duplicate id.
    pub fn from_sources<I>(sources: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = PluginSourceInfo>,
    {
        let mut registry = Self::new();
        for info in sources {
            registry.register(info)?;
        }
        Ok(registry)
    }

    /// Register a descriptor under its id.
    pub fn register(
        &mut self,
        info: PluginSourceInfo,
    ) -> Result<Arc<PluginSourceInfo>, RegistryError> {
        if self.sources.contains_key(&info.id) {
            return Err(RegistryError::Duplicate(info.id));
        }
        debug!(plugin_id = info.id, name = %info.name, "registered plugin source");
        let info = Arc::new(info);
        self.sources.insert(info.id, info.clone());
        Ok(info)
    }

    /// Descriptor registered for `id`, if any
    pub fn get(&self, id: PluginId) -> Option<&Arc<PluginSourceInfo>> {
        self.sources.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Descriptors in plugin id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PluginSourceInfo>> {
        self.sources.values()
    }
}
