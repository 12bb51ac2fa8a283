//! Theme loading errors.

use thiserror::Error;

/// Errors that can occur while loading a theme directory.
#[derive(Debug, Error)]
pub enum ThemeError {
    /// Theme directory is missing the .info.toml manifest file.
    #[error("theme directory '{path}': no .info.toml manifest found")]
    MissingManifest { path: String },

    /// Multiple .info.toml files found in the theme directory.
    #[error("theme directory '{path}': multiple .info.toml files found, expected exactly one")]
    MultipleManifests { path: String },

    /// The manifest file is not named after the theme.
    #[error("manifest '{file}.info.toml' declares theme '{name}', expected '{name}.info.toml'")]
    ManifestNameMismatch { file: String, name: String },

    /// A setting the theme does not declare.
    #[error("theme '{theme}' has no setting '{setting}'")]
    UnknownSetting { theme: String, setting: String },

    /// The manifest parsed but failed validation.
    #[error("theme '{theme}': invalid manifest: {details}")]
    InvalidManifest { theme: String, details: String },

    /// The rule table migrates past the version the manifest declares.
    #[error(
        "theme '{theme}': migration table reaches feature version {table_version} but the manifest declares {manifest_version}. Bump feature_version in the manifest"
    )]
    TableAheadOfManifest {
        theme: String,
        table_version: u32,
        manifest_version: u32,
    },
}

impl ThemeError {
    pub fn invalid(theme: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidManifest {
            theme: theme.into(),
            details: details.into(),
        }
    }
}
