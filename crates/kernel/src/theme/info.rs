//! Parser for theme `.info.toml` manifest files.
//!
//! Each theme directory has a `{name}.info.toml` file that declares:
//! - name, version, description
//! - the current feature version and the rule table that reaches it
//! - the settings the theme recognises, with their kind and default

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ThemeError;
use crate::settings::{FEATURE_VERSION_KEY, SettingsMap, is_scalar};

fn default_migrations() -> String {
    "migrations.toml".to_string()
}

/// Theme metadata parsed from `.info.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeInfo {
    /// Theme machine name; [`super::Theme::load`] requires `{name}.info.toml`.
    pub name: String,

    /// Settings scope; defaults to `theme_{name}`.
    #[serde(default)]
    component: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Release version (e.g., "4.2.0").
    pub version: String,

    /// Feature version a fully migrated installation reaches.
    #[serde(default)]
    pub feature_version: u32,

    /// Rule table path, relative to the theme directory.
    #[serde(default = "default_migrations")]
    pub migrations: String,

    /// Settings the theme recognises.
    #[serde(default)]
    pub settings: BTreeMap<String, SettingDecl>,
}

/// What kind of value a setting holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Text,
    #[serde(alias = "color")]
    Colour,
    Int,
    Bool,
    /// Rich text that may reference files through `@@PLUGINFILE@@`.
    Html,
    /// A file area (logos, slider images).
    File,
    /// JSON encoded in a string.
    Json,
}

impl SettingKind {
    /// Whether the setting owns a file area.
    pub fn has_files(self) -> bool {
        matches!(self, Self::Html | Self::File)
    }
}

/// A declared setting.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingDecl {
    pub kind: SettingKind,

    #[serde(default)]
    pub default: Option<toml::Value>,

    #[serde(default)]
    pub description: Option<String>,
}

impl SettingDecl {
    /// The default as a JSON value, if one is declared.
    pub fn default_value(&self) -> Option<Value> {
        self.default
            .as_ref()
            .and_then(|v| serde_json::to_value(v).ok())
    }
}

impl ThemeInfo {
    /// Parse a theme info file from the given path.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read theme info file: {}", path.display()))?;

        Self::parse_str(&content, path)
    }

    /// Parse theme info from a TOML string.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        let info: ThemeInfo = toml::from_str(content)
            .with_context(|| format!("failed to parse theme info TOML at {}", path.display()))?;

        info.validate()?;
        Ok(info)
    }

    /// Settings scope of this theme in the store.
    pub fn component(&self) -> String {
        self.component
            .clone()
            .unwrap_or_else(|| format!("theme_{}", self.name))
    }

    /// Declared defaults.
    pub fn defaults(&self) -> SettingsMap {
        self.settings
            .iter()
            .filter_map(|(name, decl)| decl.default_value().map(|v| (name.clone(), v)))
            .collect()
    }

    fn validate(&self) -> Result<(), ThemeError> {
        if self.name.is_empty() {
            return Err(ThemeError::invalid("(unnamed)", "empty 'name' field"));
        }

        if !is_machine_name(&self.name) {
            return Err(ThemeError::invalid(
                &self.name,
                "name must contain only lowercase letters, digits and '_'",
            ));
        }

        if self.version.is_empty() {
            return Err(ThemeError::invalid(&self.name, "empty 'version' field"));
        }

        if !is_machine_name(&self.component()) {
            return Err(ThemeError::invalid(
                &self.name,
                format!("invalid component '{}'", self.component()),
            ));
        }

        for (name, decl) in &self.settings {
            if name == FEATURE_VERSION_KEY {
                return Err(ThemeError::invalid(
                    &self.name,
                    format!("'{FEATURE_VERSION_KEY}' is reserved and cannot be declared"),
                ));
            }
            if !is_machine_name(name) {
                return Err(ThemeError::invalid(
                    &self.name,
                    format!("setting name '{name}' must contain only lowercase letters, digits and '_'"),
                ));
            }
            if let Some(default) = decl.default_value() {
                if !is_scalar(&default) {
                    return Err(ThemeError::invalid(
                        &self.name,
                        format!("setting '{name}' has a non-scalar default"),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn is_machine_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
