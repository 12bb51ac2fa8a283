//! Live upgrade of persisted settings.
//!
//! Reads the plugin's settings and watermark from the store, migrates a
//! snapshot, and writes back only what changed together with the new
//! watermark. A failing converter aborts before anything is written.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use super::evaluator::MigrationReport;
use crate::settings::{FEATURE_VERSION_KEY, SettingsDiff};
use crate::store::SettingsStore;
use crate::theme::Theme;

/// What an upgrade did.
#[derive(Debug, Clone)]
pub struct UpgradeOutcome {
    pub component: String,
    pub from_version: u32,
    pub to_version: u32,
    pub report: MigrationReport,
    /// Writes sent to the store, including the watermark.
    pub diff: SettingsDiff,
}

impl UpgradeOutcome {
    /// Whether the store was touched.
    pub fn wrote(&self) -> bool {
        !self.diff.is_empty()
    }
}

/// Bring the stored settings of `theme` up to its feature version.
pub async fn upgrade_store(store: &dyn SettingsStore, theme: &Theme) -> Result<UpgradeOutcome> {
    let component = theme.component();

    let from_version = store.feature_version(&component).await?;
    let before = store
        .settings(&component)
        .await
        .with_context(|| format!("failed to read settings of '{component}'"))?;

    let mut after = before.clone();
    let report = theme
        .migrate(&mut after, from_version)
        .with_context(|| format!("upgrade of '{component}' aborted, no settings were written"))?;

    let to_version = from_version.max(theme.feature_version());

    let mut diff = SettingsDiff::between(&before, &after);
    if to_version != from_version {
        diff = diff.write(FEATURE_VERSION_KEY, Value::from(to_version));
    }

    store
        .apply_diff(&component, &diff)
        .await
        .with_context(|| format!("failed to persist upgraded settings of '{component}'"))?;

    if diff.is_empty() {
        info!(component = %component, version = from_version, "settings already up to date");
    } else {
        info!(
            component = %component,
            from = from_version,
            to = to_version,
            changes = report.entries.len(),
            writes = diff.len(),
            "settings upgraded"
        );
    }

    Ok(UpgradeOutcome {
        component,
        from_version,
        to_version,
        report,
        diff,
    })
}
