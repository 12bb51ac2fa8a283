//! Settings storage abstraction layer.
//!
//! All reads and writes of persisted plugin settings go through
//! [`SettingsStore`]. Callers receive the store as an explicit dependency
//! instead of reaching for a process-wide config singleton, so tests swap in
//! [`MemorySettingsStore`].
//!
//! # Implementations
//!
//! - [`MemorySettingsStore`] - in-process map, for tests and dry runs
//! - [`PgSettingsStore`] - `plugin_config` table in PostgreSQL
//! - [`YamlSettingsStore`] - one YAML file per plugin in a directory

mod memory;
mod pg;
mod yaml;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemorySettingsStore;
pub use pg::PgSettingsStore;
pub use yaml::YamlSettingsStore;

use crate::settings::{FEATURE_VERSION_KEY, SettingsDiff, SettingsMap};

/// Key-value storage of plugin settings, scoped by plugin component name.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load one setting. Returns `None` if it is not set.
    async fn get(&self, plugin: &str, name: &str) -> Result<Option<Value>>;

    /// Write one setting (insert or update).
    async fn set(&self, plugin: &str, name: &str, value: &Value) -> Result<()>;

    /// Remove one setting. Returns `true` if it existed.
    async fn unset(&self, plugin: &str, name: &str) -> Result<bool>;

    /// Every stored entry of `plugin`, including the feature-version key.
    async fn all(&self, plugin: &str) -> Result<SettingsMap>;

    /// Persist a diff: removals first, then writes.
    ///
    /// The default runs one operation at a time. Backends that can make the
    /// whole diff atomic override it.
    async fn apply_diff(&self, plugin: &str, diff: &SettingsDiff) -> Result<()> {
        for name in &diff.removed {
            self.unset(plugin, name).await?;
        }
        for (name, value) in &diff.written {
            self.set(plugin, name, value).await?;
        }
        Ok(())
    }

    /// The plugin's settings without the feature-version key.
    async fn settings(&self, plugin: &str) -> Result<SettingsMap> {
        let mut map = self.all(plugin).await?;
        map.remove(FEATURE_VERSION_KEY);
        Ok(map)
    }

    /// The stored feature-version watermark, 0 when never recorded.
    async fn feature_version(&self, plugin: &str) -> Result<u32> {
        match self.get(plugin, FEATURE_VERSION_KEY).await? {
            Some(value) => parse_feature_version(&value)
                .with_context(|| format!("plugin '{plugin}': invalid stored feature version")),
            None => Ok(0),
        }
    }

    /// Record a new feature-version watermark.
    async fn set_feature_version(&self, plugin: &str, version: u32) -> Result<()> {
        self.set(plugin, FEATURE_VERSION_KEY, &Value::from(version))
            .await
    }
}

/// Read a feature version stored either as a number or as a numeric string.
pub fn parse_feature_version(value: &Value) -> Result<u32> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) => Ok(v),
        None => bail!("feature version must be a non-negative integer, got {value}"),
    }
}

/// Validate a plugin component name before it is used as a scope key or
/// a file name.
pub fn validate_plugin_name(plugin: &str) -> Result<()> {
    if plugin.is_empty() {
        bail!("plugin name is empty");
    }
    if !plugin
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        bail!("plugin name must contain only lowercase letters, digits and '_': {plugin}");
    }
    Ok(())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn feature_version_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_feature_version(&json!(7)).unwrap(), 7);
        assert_eq!(parse_feature_version(&json!(" 12 ")).unwrap(), 12);
        assert!(parse_feature_version(&json!(-1)).is_err());
        assert!(parse_feature_version(&json!("v2")).is_err());
        assert!(parse_feature_version(&json!(true)).is_err());
    }

    #[test]
    fn plugin_names_are_restricted() {
        assert!(validate_plugin_name("theme_tessera").is_ok());
        assert!(validate_plugin_name("").is_err());
        assert!(validate_plugin_name("../etc").is_err());
        assert!(validate_plugin_name("Theme").is_err());
    }

    #[tokio::test]
    async fn provided_methods_hide_feature_version() {
        let store = MemorySettingsStore::new();
        store.set("theme_x", "a", &json!("1")).await.unwrap();
        store.set_feature_version("theme_x", 4).await.unwrap();

        assert_eq!(store.feature_version("theme_x").await.unwrap(), 4);
        assert_eq!(store.all("theme_x").await.unwrap().len(), 2);

        let settings = store.settings("theme_x").await.unwrap();
        assert_eq!(settings.len(), 1);
        assert!(!settings.contains_key(FEATURE_VERSION_KEY));
    }

    #[tokio::test]
    async fn default_apply_diff_removes_then_writes() {
        let store = MemorySettingsStore::new();
        store.set("p", "old", &json!("x")).await.unwrap();

        let diff = SettingsDiff {
            removed: vec!["old".to_string()],
            ..Default::default()
        }
        .write("new", json!("x"));

        store.apply_diff("p", &diff).await.unwrap();
        assert!(store.get("p", "old").await.unwrap().is_none());
        assert_eq!(store.get("p", "new").await.unwrap(), Some(json!("x")));
    }

    #[tokio::test]
    async fn missing_feature_version_defaults_to_zero() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.feature_version("p").await.unwrap(), 0);
    }
}
