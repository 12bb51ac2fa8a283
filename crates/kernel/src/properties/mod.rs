//! Properties bundles.
//!
//! A bundle is a JSON snapshot of a theme's settings together with the files
//! in their file areas. Bundles carry the feature version they were exported
//! at, so an older bundle is migrated on import exactly like an older
//! installation is on upgrade.

mod error;
mod export;
mod import;

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub use error::PropertiesError;
pub use export::export_properties;
pub use import::{FileImport, ImportMode, ImportReport, SettingChange, import_properties};

use crate::settings::{FEATURE_VERSION_KEY, SettingsMap, is_scalar};
use crate::store::parse_feature_version;

/// Maximum accepted bundle size (64MB).
pub const MAX_BUNDLE_SIZE: u64 = 64 * 1024 * 1024;

/// A theme's settings and files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertiesBundle {
    pub component: String,

    /// Release version of the exporting theme.
    #[serde(default)]
    pub version: String,

    /// Feature version the settings are at.
    #[serde(default)]
    pub feature_version: u32,

    pub settings: SettingsMap,

    /// File area contents, by setting.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, Vec<EmbeddedFile>>,
}

/// A file carried inside a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedFile {
    /// Directory inside the file area, starting and ending with `/`.
    #[serde(default = "root_filepath")]
    pub filepath: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Hex SHA-256 of the decoded content.
    pub contenthash: String,
    /// Base64 content.
    pub content: String,
}

fn root_filepath() -> String {
    "/".to_string()
}

impl EmbeddedFile {
    /// Embed `data`.
    pub fn new(filepath: &str, filename: &str, mimetype: Option<String>, data: &[u8]) -> Self {
        Self {
            filepath: filepath.to_string(),
            filename: filename.to_string(),
            mimetype,
            contenthash: content_hash(data),
            content: STANDARD.encode(data),
        }
    }

    /// Decoded content, checked against `contenthash`.
    pub fn decode(&self, setting: &str) -> Result<Vec<u8>, PropertiesError> {
        let data = STANDARD
            .decode(self.content.trim())
            .map_err(|_| PropertiesError::bad_content(setting, &self.filename))?;
        if !content_hash(&data).eq_ignore_ascii_case(&self.contenthash) {
            return Err(PropertiesError::hash_mismatch(setting, &self.filename));
        }
        Ok(data)
    }

    /// Path relative to the file area, as html settings reference it.
    pub fn relative_path(&self) -> String {
        format!("{}{}", self.filepath.trim_start_matches('/'), self.filename)
    }
}

/// Hex SHA-256 of `data`.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

impl PropertiesBundle {
    /// Parse a bundle for `component`.
    ///
    /// Besides the current layout, accepts the legacy flat layout where every
    /// top-level key is a setting and the release version is stored under
    /// `{component}_version`. Legacy bundles are at feature version 0 unless
    /// they carry the watermark key.
    pub fn from_json(json: &str, component: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).context("bundle is not valid JSON")?;
        let Value::Object(object) = value else {
            bail!("bundle must be a JSON object");
        };

        if object.get("settings").is_some_and(Value::is_object) {
            let mut bundle: Self = serde_json::from_value(Value::Object(object))
                .context("failed to parse properties bundle")?;
            bundle.settings.remove(FEATURE_VERSION_KEY);
            return Ok(bundle);
        }

        let version_key = format!("{component}_version");
        let mut version = String::new();
        let mut feature_version = 0;
        let mut settings = SettingsMap::new();

        for (key, value) in object {
            if key == version_key {
                version = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
            } else if key == FEATURE_VERSION_KEY {
                feature_version = parse_feature_version(&value)
                    .context("legacy bundle has an invalid feature version")?;
            } else if is_scalar(&value) {
                settings.insert(key, value);
            }
        }

        Ok(Self {
            component: component.to_string(),
            version,
            feature_version,
            settings,
            files: BTreeMap::new(),
        })
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize properties bundle")
    }

    /// Number of embedded files.
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}
