//! YAML file implementation of SettingsStore.
//!
//! Each plugin's settings live in `{dir}/{plugin}.yml` as a flat mapping.
//! Writes go to a temporary file that is renamed over the original, so a
//! crash never leaves a truncated settings file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{SettingsStore, validate_plugin_name};
use crate::settings::{SettingsDiff, SettingsMap};

/// Maximum settings file size (10 MB).
const MAX_SETTINGS_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Settings stored as YAML files in a directory.
#[derive(Debug)]
pub struct YamlSettingsStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl YamlSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, plugin: &str) -> Result<PathBuf> {
        validate_plugin_name(plugin)?;
        Ok(self.dir.join(format!("{plugin}.yml")))
    }

    async fn read_map(&self, plugin: &str) -> Result<SettingsMap> {
        let path = self.path_for(plugin)?;

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SettingsMap::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to stat {}", path.display()));
            }
        };

        if metadata.len() > MAX_SETTINGS_FILE_SIZE {
            anyhow::bail!(
                "settings file {} exceeds {} bytes",
                path.display(),
                MAX_SETTINGS_FILE_SIZE
            );
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(SettingsMap::new());
        }

        serde_yml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    async fn write_map(&self, plugin: &str, map: &SettingsMap) -> Result<()> {
        let path = self.path_for(plugin)?;

        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let content = serde_yml::to_string(map).context("failed to serialize settings")?;
        let tmp = path.with_extension("yml.tmp");

        fs::write(&tmp, content)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;

        debug!(plugin, path = %path.display(), settings = map.len(), "settings file written");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for YamlSettingsStore {
    async fn get(&self, plugin: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.read_map(plugin).await?.remove(name))
    }

    async fn set(&self, plugin: &str, name: &str, value: &Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(plugin).await?;
        map.insert(name.to_string(), value.clone());
        self.write_map(plugin, &map).await
    }

    async fn unset(&self, plugin: &str, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(plugin).await?;
        if map.remove(name).is_none() {
            return Ok(false);
        }
        self.write_map(plugin, &map).await?;
        Ok(true)
    }

    async fn all(&self, plugin: &str) -> Result<SettingsMap> {
        self.read_map(plugin).await
    }

    /// One read and one atomic file replacement for the whole diff.
    async fn apply_diff(&self, plugin: &str, diff: &SettingsDiff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(plugin).await?;
        diff.apply_to(&mut map);
        self.write_map(plugin, &map).await
    }
}
