//! Properties bundle errors.

use thiserror::Error;

/// Reasons a bundle cannot be imported.
#[derive(Debug, Error)]
pub enum PropertiesError {
    /// The bundle was exported from a different component.
    #[error("bundle belongs to '{found}', expected '{expected}'")]
    ComponentMismatch { expected: String, found: String },

    /// The bundle comes from a newer release than the installed theme.
    #[error(
        "bundle has feature version {bundle} but '{component}' only reaches {installed}; upgrade the theme first"
    )]
    NewerBundle {
        component: String,
        bundle: u32,
        installed: u32,
    },

    /// An embedded file's content is not valid base64.
    #[error("file '{filename}' of setting '{setting}' has undecodable content")]
    BadContent { setting: String, filename: String },

    /// An embedded file does not match its recorded hash.
    #[error("file '{filename}' of setting '{setting}' does not match its content hash")]
    HashMismatch { setting: String, filename: String },
}

impl PropertiesError {
    pub fn bad_content(setting: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::BadContent {
            setting: setting.into(),
            filename: filename.into(),
        }
    }

    pub fn hash_mismatch(setting: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::HashMismatch {
            setting: setting.into(),
            filename: filename.into(),
        }
    }
}
