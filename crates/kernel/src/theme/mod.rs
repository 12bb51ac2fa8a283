//! Loaded theme configuration.
//!
//! A [`Theme`] bundles the parsed manifest, the validated rule table and the
//! converter registry the table was checked against. It is built once and
//! passed by reference to the upgrade, import and export paths.

mod error;
mod info;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

pub use error::ThemeError;
pub use info::{SettingDecl, SettingKind, ThemeInfo};

use crate::file::{FileStorage, area_uri};
use crate::migration::{
    ConverterRegistry, MigrationError, MigrationReport, MigrationTable, apply_migrations,
};
use crate::pluginfile::{encode_pluginfile_urls, referenced_files, setting_file_base};
use crate::settings::SettingsMap;
use crate::store::SettingsStore;

/// A setting written by [`Theme::save_setting`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSetting {
    pub name: String,
    /// Value as stored, html with file links encoded as tokens.
    pub value: Value,
    /// Files the value refers to that are not in the setting's file area.
    pub missing_files: Vec<String>,
}

/// A theme ready to migrate settings.
#[derive(Debug, Clone)]
pub struct Theme {
    info: ThemeInfo,
    table: MigrationTable,
    converters: ConverterRegistry,
    dir: PathBuf,
}

impl Theme {
    /// Load a theme directory with the built-in converters.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_with(dir, ConverterRegistry::with_builtins())
    }

    /// Load a theme directory, validating its rule table against `converters`.
    ///
    /// A missing rule table file means the theme has no migrations.
    pub fn load_with(dir: &Path, converters: ConverterRegistry) -> Result<Self> {
        let manifest = find_manifest(dir)?;
        let info = ThemeInfo::parse(&manifest)?;

        let stem = manifest
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".info.toml"))
            .unwrap_or_default();
        if stem != info.name {
            return Err(ThemeError::ManifestNameMismatch {
                file: stem.to_string(),
                name: info.name.clone(),
            }
            .into());
        }

        let table_path = dir.join(&info.migrations);
        let table = if table_path.exists() {
            MigrationTable::load(&table_path, &converters)?
        } else {
            MigrationTable::default()
        };

        let mut theme = Self::from_parts(info, table, converters)?;
        theme.dir = dir.to_path_buf();
        Ok(theme)
    }

    /// Assemble a theme from already-parsed parts.
    pub fn from_parts(
        info: ThemeInfo,
        table: MigrationTable,
        converters: ConverterRegistry,
    ) -> Result<Self> {
        table
            .validate(&converters)
            .with_context(|| format!("theme '{}': invalid migration table", info.name))?;

        if table.latest_version() > info.feature_version {
            return Err(ThemeError::TableAheadOfManifest {
                theme: info.name.clone(),
                table_version: table.latest_version(),
                manifest_version: info.feature_version,
            }
            .into());
        }

        Ok(Self {
            info,
            table,
            converters,
            dir: PathBuf::new(),
        })
    }

    pub fn info(&self) -> &ThemeInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Settings scope in the store.
    pub fn component(&self) -> String {
        self.info.component()
    }

    /// Feature version of a fully migrated installation.
    pub fn feature_version(&self) -> u32 {
        self.info.feature_version
    }

    pub fn table(&self) -> &MigrationTable {
        &self.table
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Directory the theme was loaded from (empty for [`Theme::from_parts`]).
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run the theme's rule table over `map`.
    pub fn migrate(
        &self,
        map: &mut SettingsMap,
        feature_version: u32,
    ) -> Result<MigrationReport, MigrationError> {
        apply_migrations(map, feature_version, &self.table, &self.converters)
    }

    pub fn setting(&self, name: &str) -> Option<&SettingDecl> {
        self.info.settings.get(name)
    }

    /// Whether `name` is a setting this theme declares.
    pub fn is_known(&self, name: &str) -> bool {
        self.info.settings.contains_key(name)
    }

    /// Settings owning a file area, in name order.
    pub fn file_settings(&self) -> impl Iterator<Item = (&str, SettingKind)> {
        self.info
            .settings
            .iter()
            .filter(|(_, decl)| decl.kind.has_files())
            .map(|(name, decl)| (name.as_str(), decl.kind))
    }

    /// Declared defaults.
    pub fn defaults(&self) -> SettingsMap {
        self.info.defaults()
    }

    /// Defaults overlaid with the stored values of declared settings.
    pub async fn effective_settings(&self, store: &dyn SettingsStore) -> Result<SettingsMap> {
        let mut effective = self.defaults();
        let stored = store.settings(&self.component()).await?;
        for (name, value) in stored {
            if self.is_known(&name) {
                effective.insert(name, value);
            }
        }
        Ok(effective)
    }

    /// Parse `raw` for the declared setting `name` and store it.
    ///
    /// Int and bool settings go through the `int` and `bool` converters, json
    /// settings must parse. Html has absolute links into its own file area
    /// turned back into `@@PLUGINFILE@@` tokens; references to files the
    /// area does not hold are reported, not refused.
    pub async fn save_setting(
        &self,
        store: &dyn SettingsStore,
        files: &dyn FileStorage,
        name: &str,
        raw: &str,
    ) -> Result<SavedSetting> {
        let decl = self.setting(name).ok_or_else(|| ThemeError::UnknownSetting {
            theme: self.name().to_string(),
            setting: name.to_string(),
        })?;
        let component = self.component();

        let raw_value = Value::String(raw.to_string());
        let mut missing_files = Vec::new();
        let value = match decl.kind {
            SettingKind::Int => self.converters.convert("int", &raw_value),
            SettingKind::Bool => self.converters.convert("bool", &raw_value),
            _ => Ok(raw_value),
        }
        .with_context(|| format!("invalid value for setting '{name}'"))?;

        let value = match decl.kind {
            SettingKind::Json => {
                serde_json::from_str::<Value>(raw)
                    .with_context(|| format!("setting '{name}' must hold valid JSON"))?;
                value
            }
            SettingKind::Html => {
                let base = setting_file_base(files, &component, name);
                let encoded = encode_pluginfile_urls(raw, &base)?;
                for path in referenced_files(&encoded) {
                    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                    let present = match area_uri(&component, name, dir, file) {
                        Ok(uri) => files.exists(&uri).await?,
                        Err(_) => false,
                    };
                    if !present {
                        warn!(setting = %name, file = %path, "referenced file missing from file area");
                        missing_files.push(path);
                    }
                }
                Value::String(encoded)
            }
            _ => value,
        };

        store.set(&component, name, &value).await?;
        info!(component = %component, setting = %name, "setting saved");

        Ok(SavedSetting {
            name: name.to_string(),
            value,
            missing_files,
        })
    }
}

/// Find the single `.info.toml` manifest in `dir`.
fn find_manifest(dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read theme directory {}", dir.display()))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_manifest = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".info.toml"));
        if is_manifest {
            manifests.push(path);
        }
    }

    match manifests.len() {
        0 => Err(ThemeError::MissingManifest {
            path: dir.display().to_string(),
        }
        .into()),
        1 => Ok(manifests.remove(0)),
        _ => Err(ThemeError::MultipleManifests {
            path: dir.display().to_string(),
        }
        .into()),
    }
}
