//! Settings maps and the differences between them.
//!
//! A settings map holds every configuration entry of one plugin, keyed by
//! setting name. Values are JSON scalars: the live store keeps them as JSONB
//! and properties bundles carry them as plain JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Setting name to value, ordered so reports and exports are deterministic.
pub type SettingsMap = BTreeMap<String, Value>;

/// Reserved key holding the feature-version watermark in a plugin's scope.
///
/// It lives next to the settings in the store but is never migrated,
/// exported or imported as a setting.
pub const FEATURE_VERSION_KEY: &str = "featureversion";

/// The writes needed to turn one settings map into another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsDiff {
    /// Keys present before and absent after.
    pub removed: Vec<String>,

    /// Keys that are new or whose value changed, with their new value.
    pub written: BTreeMap<String, Value>,
}

impl SettingsDiff {
    /// Compute the diff from `before` to `after`.
    pub fn between(before: &SettingsMap, after: &SettingsMap) -> Self {
        let removed = before
            .keys()
            .filter(|k| !after.contains_key(*k))
            .cloned()
            .collect();

        let written = after
            .iter()
            .filter(|(k, v)| before.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self { removed, written }
    }

    /// Record that `key` should be written with `value`.
    pub fn write(mut self, key: impl Into<String>, value: Value) -> Self {
        self.written.insert(key.into(), value);
        self
    }

    /// True when applying the diff would not touch the store.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.written.is_empty()
    }

    /// Number of individual store operations in this diff.
    pub fn len(&self) -> usize {
        self.removed.len() + self.written.len()
    }

    /// Apply the diff to an in-memory map.
    pub fn apply_to(&self, map: &mut SettingsMap) {
        for key in &self.removed {
            map.remove(key);
        }
        for (key, value) in &self.written {
            map.insert(key.clone(), value.clone());
        }
    }
}

/// Render a setting value for log and report lines.
///
/// Strings are shown without JSON quotes; everything else uses its JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(null)".to_string(),
        other => other.to_string(),
    }
}

/// True when `value` is a scalar a setting may hold.
pub fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
