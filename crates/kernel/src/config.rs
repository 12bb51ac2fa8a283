//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. When unset, settings live in YAML files.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 5).
    pub database_max_connections: u32,

    /// Path to themes directory (default: ./themes).
    pub themes_dir: PathBuf,

    /// Theme to operate on (default: tessera).
    pub theme: String,

    /// Directory of the YAML settings store (default: ./settings).
    pub settings_dir: PathBuf,

    /// Path to uploads directory (default: ./uploads).
    pub uploads_dir: PathBuf,

    /// Base URL for serving setting files (default: /pluginfile).
    pub files_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let themes_dir = lookup("THEMES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./themes"));

        let theme = lookup("THEME").unwrap_or_else(|| "tessera".to_string());

        let settings_dir = lookup("SETTINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./settings"));

        let uploads_dir = lookup("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        let files_url = lookup("FILES_URL").unwrap_or_else(|| "/pluginfile".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            themes_dir,
            theme,
            settings_dir,
            uploads_dir,
            files_url,
        })
    }

    /// Directory of the configured theme.
    pub fn theme_dir(&self) -> PathBuf {
        self.themes_dir.join(&self.theme)
    }
}
