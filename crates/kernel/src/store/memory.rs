//! In-memory settings store.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::SettingsStore;
use crate::settings::SettingsMap;

/// Settings held in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    plugins: RwLock<HashMap<String, SettingsMap>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `settings` for `plugin`.
    pub fn with_settings(plugin: impl Into<String>, settings: SettingsMap) -> Self {
        let store = Self::new();
        store.plugins.write().insert(plugin.into(), settings);
        store
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, plugin: &str, name: &str) -> Result<Option<Value>> {
        Ok(self
            .plugins
            .read()
            .get(plugin)
            .and_then(|m| m.get(name))
            .cloned())
    }

    async fn set(&self, plugin: &str, name: &str, value: &Value) -> Result<()> {
        self.plugins
            .write()
            .entry(plugin.to_string())
            .or_default()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    async fn unset(&self, plugin: &str, name: &str) -> Result<bool> {
        Ok(self
            .plugins
            .write()
            .get_mut(plugin)
            .is_some_and(|m| m.remove(name).is_some()))
    }

    async fn all(&self, plugin: &str) -> Result<SettingsMap> {
        Ok(self.plugins.read().get(plugin).cloned().unwrap_or_default())
    }
}
