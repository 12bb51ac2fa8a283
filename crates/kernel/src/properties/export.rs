use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::info;

use super::{EmbeddedFile, PropertiesBundle};
use crate::file::{FileStorage, area_prefix, split_area_uri};
use crate::store::SettingsStore;
use crate::theme::Theme;

/// Snapshot the stored settings and file areas of `theme`.
pub async fn export_properties(
    theme: &Theme,
    store: &dyn SettingsStore,
    files: &dyn FileStorage,
) -> Result<PropertiesBundle> {
    let component = theme.component();
    let settings = store.settings(&component).await?;
    let feature_version = store.feature_version(&component).await?;

    let mut embedded = BTreeMap::new();
    for (setting, _) in theme.file_settings() {
        let prefix = area_prefix(&component, setting);
        let mut area = Vec::new();
        for uri in files.list(&prefix).await? {
            let Some((filepath, filename)) = split_area_uri(&prefix, &uri) else {
                continue;
            };
            let data = files
                .read(&uri)
                .await
                .with_context(|| format!("failed to export {uri}"))?;
            let mimetype = infer::get(&data).map(|kind| kind.mime_type().to_string());
            area.push(EmbeddedFile::new(&filepath, filename, mimetype, &data));
        }
        if !area.is_empty() {
            embedded.insert(setting.to_string(), area);
        }
    }

    let bundle = PropertiesBundle {
        component,
        version: theme.info().version.clone(),
        feature_version,
        settings,
        files: embedded,
    };

    info!(
        component = %bundle.component,
        feature_version = bundle.feature_version,
        settings = bundle.settings.len(),
        files = bundle.file_count(),
        "properties exported"
    );

    Ok(bundle)
}
