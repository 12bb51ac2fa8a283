//! CLI command implementations.
//!
//! Each command works against an explicit store, file storage and theme;
//! nothing here holds global state.

use std::path::Path;

use anyhow::{Context, Result, bail};

use serde_json::Value;

use crate::file::FileStorage;
use crate::migration::upgrade_store;
use crate::pluginfile::{rewrite_pluginfile_urls, setting_file_base};
use crate::properties::{
    ImportMode, MAX_BUNDLE_SIZE, PropertiesBundle, export_properties, import_properties,
};
use crate::settings::display_value;
use crate::store::SettingsStore;
use crate::theme::{SettingKind, Theme};

/// Bring the stored settings up to the theme's feature version.
pub async fn cmd_upgrade(store: &dyn SettingsStore, theme: &Theme) -> Result<()> {
    let outcome = upgrade_store(store, theme).await?;

    if !outcome.wrote() {
        println!(
            "'{}' is up to date at feature version {}.",
            outcome.component, outcome.from_version
        );
        return Ok(());
    }

    println!(
        "Upgraded '{}' from feature version {} to {}.",
        outcome.component, outcome.from_version, outcome.to_version
    );
    for line in outcome.report.lines() {
        println!("  {line}");
    }
    Ok(())
}

/// Print the effective settings of the theme.
///
/// Html values are shown with their file tokens resolved to public URLs.
pub async fn cmd_show(
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
    theme: &Theme,
) -> Result<()> {
    let component = theme.component();
    let stored = store.settings(&component).await?;
    let feature_version = store.feature_version(&component).await?;

    println!(
        "{} v{} (feature version {} of {})",
        component,
        theme.info().version,
        feature_version,
        theme.feature_version()
    );

    if theme.info().settings.is_empty() && stored.is_empty() {
        println!("No settings.");
        return Ok(());
    }

    println!("{:<32} {:<10} {:<8} VALUE", "SETTING", "KIND", "SOURCE");
    println!("{}", "-".repeat(72));

    for (name, decl) in &theme.info().settings {
        let (source, value) = match (stored.get(name), decl.default_value()) {
            (Some(v), _) => ("stored", display_value(v)),
            (None, Some(d)) => ("default", display_value(&d)),
            (None, None) => ("unset", String::new()),
        };
        let value = if decl.kind == SettingKind::Html {
            rewrite_pluginfile_urls(&value, &setting_file_base(files, &component, name))
        } else {
            value
        };
        let kind = format!("{:?}", decl.kind).to_lowercase();
        println!("{name:<32} {kind:<10} {source:<8} {value}");
    }

    for (name, value) in &stored {
        if !theme.is_known(name) {
            println!(
                "{:<32} {:<10} {:<8} {}",
                name,
                "?",
                "orphan",
                display_value(value)
            );
        }
    }

    Ok(())
}

/// Store one setting from its command-line form.
pub async fn cmd_set(
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
    theme: &Theme,
    name: &str,
    value: &str,
) -> Result<()> {
    let saved = theme.save_setting(store, files, name, value).await?;

    let shown = match &saved.value {
        Value::String(s) if s.len() > 60 => format!("{}...", s.chars().take(60).collect::<String>()),
        other => display_value(other),
    };
    println!("Setting '{}' saved as '{shown}'.", saved.name);
    for path in &saved.missing_files {
        println!("  Warning: '{path}' is not in the file area of '{}'.", saved.name);
    }
    Ok(())
}

/// Print the rule table, marking groups that have not run yet.
pub async fn cmd_rules(store: &dyn SettingsStore, theme: &Theme) -> Result<()> {
    let feature_version = store.feature_version(&theme.component()).await?;

    if theme.table().is_empty() {
        println!("Theme '{}' has no migration rules.", theme.name());
        return Ok(());
    }

    for group in theme.table().groups() {
        let status = if group.is_pending(feature_version) {
            "pending"
        } else {
            "applied"
        };
        match &group.description {
            Some(description) => {
                println!("[{}] {status}: {description}", group.threshold);
            }
            None => println!("[{}] {status}", group.threshold),
        }
        for rule in &group.rules {
            println!("  {rule}");
        }
    }

    Ok(())
}

/// Write a properties bundle to `path`.
pub async fn cmd_export(
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
    theme: &Theme,
    path: &Path,
) -> Result<()> {
    let bundle = export_properties(theme, store, files).await?;
    let json = bundle.to_json()?;

    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!(
        "Exported {} settings and {} files of '{}' to {}.",
        bundle.settings.len(),
        bundle.file_count(),
        bundle.component,
        path.display()
    );
    Ok(())
}

/// Import a properties bundle from `path`, or only compare with `compare`.
pub async fn cmd_import(
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
    theme: &Theme,
    path: &Path,
    compare: bool,
) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    if metadata.len() > MAX_BUNDLE_SIZE {
        bail!(
            "{}: file size {} bytes exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_BUNDLE_SIZE
        );
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let bundle = PropertiesBundle::from_json(&content, &theme.component())
        .with_context(|| format!("invalid properties bundle {}", path.display()))?;

    let mode = if compare {
        ImportMode::Compare
    } else {
        ImportMode::Apply
    };
    let report = import_properties(theme, store, files, &bundle, mode).await?;

    let lines = report.lines();
    if lines.is_empty() {
        println!("Nothing to import.");
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
