use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{EmbeddedFile, PropertiesBundle, PropertiesError};
use crate::file::{FileStorage, area_prefix, area_uri};
use crate::migration::MigrationReport;
use crate::pluginfile::referenced_files;
use crate::settings::{FEATURE_VERSION_KEY, SettingsDiff, display_value, is_scalar};
use crate::store::SettingsStore;
use crate::theme::{SettingKind, Theme};

const FALLBACK_MIMETYPE: &str = "application/octet-stream";

/// Whether an import writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Persist changed settings and replace file areas.
    Apply,
    /// Report what would change without writing.
    Compare,
}

/// A setting whose imported value differs from the stored one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingChange {
    pub name: String,
    /// Stored value, `None` when the setting was not set.
    pub old: Option<Value>,
    pub new: Value,
}

/// A file taken from the bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileImport {
    pub setting: String,
    pub filepath: String,
    pub filename: String,
    pub mimetype: String,
    pub size: usize,
}

/// What an import did, or would do in compare mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub mode: ImportMode,
    /// Pending upgrade of the stored settings, applied along with the import.
    pub store_migration: MigrationReport,
    /// Migration of the bundle's settings to the theme's feature version.
    pub migration: MigrationReport,
    pub changed: Vec<SettingChange>,
    pub unchanged: Vec<String>,
    /// Bundle settings the theme does not declare.
    pub ignored: Vec<String>,
    pub files: Vec<FileImport>,
    pub warnings: Vec<String>,
}

impl ImportReport {
    fn new(mode: ImportMode, store_migration: MigrationReport, migration: MigrationReport) -> Self {
        Self {
            mode,
            store_migration,
            migration,
            changed: Vec::new(),
            unchanged: Vec::new(),
            ignored: Vec::new(),
            files: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Human-readable report.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.store_migration.advanced() {
            let verb = match self.mode {
                ImportMode::Apply => "upgraded",
                ImportMode::Compare => "would be upgraded",
            };
            lines.push(format!(
                "Stored settings {verb} from feature version {} to {}.",
                self.store_migration.from_version, self.store_migration.feature_version
            ));
            lines.extend(self.store_migration.lines());
        }

        if self.migration.advanced() {
            lines.push(format!(
                "Bundle migrated from feature version {} to {}.",
                self.migration.from_version, self.migration.feature_version
            ));
            lines.extend(self.migration.lines());
        }

        for change in &self.changed {
            lines.push(match &change.old {
                Some(old) => format!(
                    "Setting '{}' changed from '{}' to '{}'.",
                    change.name,
                    display_value(old),
                    display_value(&change.new)
                ),
                None => format!(
                    "Setting '{}' set to '{}'.",
                    change.name,
                    display_value(&change.new)
                ),
            });
        }

        if !self.unchanged.is_empty() {
            lines.push(format!("{} settings unchanged.", self.unchanged.len()));
        }

        for name in &self.ignored {
            lines.push(format!("Setting '{name}' ignored, not defined by this theme."));
        }

        for file in &self.files {
            lines.push(format!(
                "File '{}{}' ({}, {} bytes) for setting '{}'.",
                file.filepath, file.filename, file.mimetype, file.size, file.setting
            ));
        }

        lines.extend(self.warnings.iter().cloned());

        if self.mode == ImportMode::Compare {
            lines.push("Compare only, nothing was written.".to_string());
        }

        lines
    }
}

/// Import `bundle` into the stored settings of `theme`.
///
/// The bundle is migrated from its own feature version first. Stored
/// settings that are behind the theme are upgraded in the same write, so
/// the comparison is always between fully migrated maps. Undeclared
/// settings and non-scalar values are ignored. A file failing its hash
/// check or carrying an unsafe path aborts the import before anything is
/// written.
pub async fn import_properties(
    theme: &Theme,
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
    bundle: &PropertiesBundle,
    mode: ImportMode,
) -> Result<ImportReport> {
    let component = theme.component();
    if bundle.component != component {
        return Err(PropertiesError::ComponentMismatch {
            expected: component,
            found: bundle.component.clone(),
        }
        .into());
    }
    if bundle.feature_version > theme.feature_version() {
        return Err(PropertiesError::NewerBundle {
            component,
            bundle: bundle.feature_version,
            installed: theme.feature_version(),
        }
        .into());
    }

    let mut incoming = bundle.settings.clone();
    incoming.remove(FEATURE_VERSION_KEY);
    let migration = theme
        .migrate(&mut incoming, bundle.feature_version)
        .context("bundle settings could not be migrated")?;

    let stored_version = store.feature_version(&component).await?;
    let stored = store.settings(&component).await?;
    let mut current = stored.clone();
    let store_migration = theme
        .migrate(&mut current, stored_version)
        .context("stored settings could not be migrated")?;

    let mut report = ImportReport::new(mode, store_migration, migration);

    let file_settings: BTreeMap<&str, SettingKind> = theme.file_settings().collect();

    for (name, kind) in &file_settings {
        if *kind != SettingKind::Html {
            continue;
        }
        let Some(Value::String(html)) = incoming.get(*name) else {
            continue;
        };
        let available: BTreeSet<String> = bundle
            .files
            .get(*name)
            .map(|area| area.iter().map(EmbeddedFile::relative_path).collect())
            .unwrap_or_default();
        for path in referenced_files(html) {
            if !available.contains(&path) {
                warn!(setting = %name, file = %path, "referenced file missing from bundle");
                report.warnings.push(format!(
                    "Setting '{name}' references file '{path}' which is not in the bundle."
                ));
            }
        }
    }

    let mut target = current.clone();
    for (name, value) in incoming {
        if !theme.is_known(&name) {
            warn!(component = %component, setting = %name, "ignoring undeclared setting");
            report.ignored.push(name);
            continue;
        }
        if !is_scalar(&value) {
            warn!(component = %component, setting = %name, "ignoring non-scalar value");
            report.warnings.push(format!(
                "Setting '{name}' ignored, value {value} is not a string, number or boolean."
            ));
            continue;
        }
        match current.get(&name) {
            Some(old) if *old == value => report.unchanged.push(name),
            old => {
                report.changed.push(SettingChange {
                    name: name.clone(),
                    old: old.cloned(),
                    new: value.clone(),
                });
                target.insert(name, value);
            }
        }
    }

    let mut areas = Vec::new();
    for (setting, embedded) in &bundle.files {
        if !file_settings.contains_key(setting.as_str()) {
            warn!(component = %component, setting = %setting, "ignoring files of undeclared setting");
            report
                .warnings
                .push(format!("Files for setting '{setting}' ignored, not a file setting."));
            continue;
        }

        let mut area = Vec::new();
        for file in embedded {
            let data = file.decode(setting)?;
            let uri = area_uri(&component, setting, &file.filepath, &file.filename)?;
            let mimetype = file
                .mimetype
                .clone()
                .or_else(|| infer::get(&data).map(|kind| kind.mime_type().to_string()))
                .unwrap_or_else(|| FALLBACK_MIMETYPE.to_string());

            report.files.push(FileImport {
                setting: setting.clone(),
                filepath: file.filepath.clone(),
                filename: file.filename.clone(),
                mimetype,
                size: data.len(),
            });
            area.push((uri, data));
        }
        areas.push((setting.as_str(), area));
    }

    if mode == ImportMode::Compare {
        info!(
            component = %component,
            changed = report.changed.len(),
            ignored = report.ignored.len(),
            "properties compared"
        );
        return Ok(report);
    }

    let mut diff = SettingsDiff::between(&stored, &target);
    let to_version = stored_version.max(theme.feature_version());
    if to_version != stored_version {
        diff = diff.write(FEATURE_VERSION_KEY, Value::from(to_version));
    }
    store
        .apply_diff(&component, &diff)
        .await
        .with_context(|| format!("failed to persist imported settings of '{component}'"))?;

    for (setting, area) in areas {
        let prefix = area_prefix(&component, setting);
        let keep: BTreeSet<&str> = area.iter().map(|(uri, _)| uri.as_str()).collect();
        for existing in files.list(&prefix).await? {
            if !keep.contains(existing.as_str()) {
                files.delete(&existing).await?;
            }
        }
        for (uri, data) in &area {
            files.write(uri, data).await?;
        }
    }

    info!(
        component = %component,
        changed = report.changed.len(),
        ignored = report.ignored.len(),
        files = report.files.len(),
        "properties imported"
    );

    Ok(report)
}
