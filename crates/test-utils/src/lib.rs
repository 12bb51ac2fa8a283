//! Tessera test utilities.
//!
//! Helpers for integration testing: settings map fixtures, theme directory
//! builders and assertion utilities for report output.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

/// Build a settings map from pairs.
pub fn settings_map(pairs: &[(&str, JsonValue)]) -> BTreeMap<String, JsonValue> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Create a test theme with default values.
pub fn test_theme(name: &str) -> TestTheme {
    TestTheme {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        feature_version: 0,
        settings: toml::Table::new(),
        groups: Vec::new(),
    }
}

/// A theme directory builder.
#[derive(Debug, Clone)]
pub struct TestTheme {
    pub name: String,
    pub version: String,
    pub feature_version: u32,
    settings: toml::Table,
    groups: Vec<toml::Table>,
}

impl TestTheme {
    /// Set the release version.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the declared feature version.
    pub fn with_feature_version(mut self, feature_version: u32) -> Self {
        self.feature_version = feature_version;
        self
    }

    /// Declare a setting without a default.
    pub fn with_setting(mut self, name: &str, kind: &str) -> Self {
        let mut decl = toml::Table::new();
        decl.insert("kind".to_string(), kind.into());
        self.settings
            .insert(name.to_string(), toml::Value::Table(decl));
        self
    }

    /// Declare a setting with a default.
    pub fn with_default(mut self, name: &str, kind: &str, default: impl Into<toml::Value>) -> Self {
        let mut decl = toml::Table::new();
        decl.insert("kind".to_string(), kind.into());
        decl.insert("default".to_string(), default.into());
        self.settings
            .insert(name.to_string(), toml::Value::Table(decl));
        self
    }

    /// Start a rule group. Rules added next belong to it.
    pub fn group(mut self, threshold: u32) -> Self {
        let mut group = toml::Table::new();
        group.insert("threshold".to_string(), i64::from(threshold).into());
        group.insert("rule".to_string(), toml::Value::Array(Vec::new()));
        self.groups.push(group);
        self
    }

    /// Add a rename rule to the current group.
    pub fn rename(self, from: &str, to: &str) -> Self {
        self.rule(&[("kind", "rename"), ("from", from), ("to", to)])
    }

    /// Add a converting rename rule to the current group.
    pub fn rename_with(self, from: &str, to: &str, convert: &str) -> Self {
        self.rule(&[
            ("kind", "rename"),
            ("from", from),
            ("to", to),
            ("convert", convert),
        ])
    }

    /// Add an in-place conversion rule to the current group.
    pub fn convert(self, key: &str, convert: &str) -> Self {
        self.rule(&[("kind", "convert"), ("from", key), ("convert", convert)])
    }

    /// Add a delete rule to the current group.
    pub fn delete(self, key: &str) -> Self {
        self.rule(&[("kind", "delete"), ("from", key)])
    }

    fn rule(mut self, fields: &[(&str, &str)]) -> Self {
        let rule: toml::Table = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), toml::Value::from(*v)))
            .collect();
        if let Some(toml::Value::Array(rules)) =
            self.groups.last_mut().and_then(|g| g.get_mut("rule"))
        {
            rules.push(toml::Value::Table(rule));
        }
        self
    }

    /// The `.info.toml` manifest.
    pub fn info_toml(&self) -> String {
        let mut info = toml::Table::new();
        info.insert("name".to_string(), self.name.as_str().into());
        info.insert("version".to_string(), self.version.as_str().into());
        info.insert(
            "feature_version".to_string(),
            i64::from(self.feature_version).into(),
        );
        info.insert(
            "settings".to_string(),
            toml::Value::Table(self.settings.clone()),
        );
        info.to_string()
    }

    /// The rule table.
    pub fn migrations_toml(&self) -> String {
        let groups = self
            .groups
            .iter()
            .cloned()
            .map(toml::Value::Table)
            .collect();
        let mut table = toml::Table::new();
        table.insert("group".to_string(), toml::Value::Array(groups));
        table.to_string()
    }

    /// Write the theme into `{root}/{name}` and return that directory.
    pub fn write_to(&self, root: &Path) -> io::Result<PathBuf> {
        let dir = root.join(&self.name);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(format!("{}.info.toml", self.name)), self.info_toml())?;
        if !self.groups.is_empty() {
            std::fs::write(dir.join("migrations.toml"), self.migrations_toml())?;
        }
        Ok(dir)
    }
}

/// Assertion helpers for JSON values and report lines.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual,
            expected,
            "JSON mismatch:\nactual: {}\nexpected: {}",
            serde_json::to_string_pretty(actual).unwrap_or_default(),
            serde_json::to_string_pretty(expected).unwrap_or_default()
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that some report line contains `needle`.
    pub fn has_line(lines: &[String], needle: &str) {
        assert!(
            lines.iter().any(|line| line.contains(needle)),
            "Expected a line containing '{needle}'\nActual:\n{}",
            lines.join("\n")
        );
    }
}
