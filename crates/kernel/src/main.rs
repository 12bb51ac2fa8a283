//! Tessera
//!
//! Theme settings upgrade, inspection, editing and properties import/export.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tessera_kernel::cli;
use tessera_kernel::config::Config;
use tessera_kernel::file::LocalFileStorage;
use tessera_kernel::store::{PgSettingsStore, SettingsStore, YamlSettingsStore};
use tessera_kernel::theme::Theme;

/// Theme settings tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Theme directory (overrides THEMES_DIR and THEME).
    #[arg(long, global = true)]
    theme_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate stored settings to the theme's feature version.
    Upgrade,
    /// Show the effective settings.
    Show,
    /// Save one setting.
    Set {
        /// Setting name.
        name: String,
        /// New value; html may link into the setting's file area by URL.
        value: String,
    },
    /// List migration rule groups.
    Rules,
    /// Export settings and files to a properties bundle.
    Export {
        /// Output file.
        path: PathBuf,
    },
    /// Import a properties bundle.
    Import {
        /// Bundle file.
        path: PathBuf,
        /// Report differences without writing.
        #[arg(long)]
        compare: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    let theme_dir = args.theme_dir.unwrap_or_else(|| config.theme_dir());
    let theme = Theme::load(&theme_dir)
        .with_context(|| format!("failed to load theme from {}", theme_dir.display()))?;
    info!(
        theme = theme.name(),
        feature_version = theme.feature_version(),
        groups = theme.table().groups().len(),
        "Theme loaded"
    );

    let store = open_store(&config).await?;
    let files = LocalFileStorage::new(&config.uploads_dir, &config.files_url);

    match args.command {
        Command::Upgrade => cli::cmd_upgrade(store.as_ref(), &theme).await,
        Command::Show => cli::cmd_show(store.as_ref(), &files, &theme).await,
        Command::Set { name, value } => {
            cli::cmd_set(store.as_ref(), &files, &theme, &name, &value).await
        }
        Command::Rules => cli::cmd_rules(store.as_ref(), &theme).await,
        Command::Export { path } => cli::cmd_export(store.as_ref(), &files, &theme, &path).await,
        Command::Import { path, compare } => {
            cli::cmd_import(store.as_ref(), &files, &theme, &path, compare).await
        }
    }
}

/// PostgreSQL when `DATABASE_URL` is set, the YAML directory otherwise.
async fn open_store(config: &Config) -> Result<Box<dyn SettingsStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgSettingsStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            store.ensure_schema().await?;
            info!("Using PostgreSQL settings store");
            Ok(Box::new(store))
        }
        None => {
            info!(dir = %config.settings_dir.display(), "Using YAML settings store");
            Ok(Box::new(YamlSettingsStore::new(&config.settings_dir)))
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
