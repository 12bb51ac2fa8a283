//! PostgreSQL implementation of SettingsStore.
//!
//! Settings live in the `plugin_config` table, one row per plugin and
//! setting, with the value stored as JSONB.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::SettingsStore;
use crate::settings::{SettingsDiff, SettingsMap};

const SCHEMA: &str = include_str!("../../migrations/0001_plugin_config.sql");

/// Settings stored in PostgreSQL.
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with at most `max_connections` connections.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Create the `plugin_config` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to create plugin_config table")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self, plugin: &str, name: &str) -> Result<Option<Value>> {
        sqlx::query_scalar::<_, Value>(
            "SELECT value FROM plugin_config WHERE plugin = $1 AND name = $2",
        )
        .bind(plugin)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("failed to get plugin setting")
    }

    async fn set(&self, plugin: &str, name: &str, value: &Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plugin_config (plugin, name, value, updated)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (plugin, name) DO UPDATE SET value = $3, updated = $4
            "#,
        )
        .bind(plugin)
        .bind(name)
        .bind(value.clone())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("failed to set plugin setting")?;

        Ok(())
    }

    async fn unset(&self, plugin: &str, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plugin_config WHERE plugin = $1 AND name = $2")
            .bind(plugin)
            .bind(name)
            .execute(&self.pool)
            .await
            .context("failed to unset plugin setting")?;

        Ok(result.rows_affected() > 0)
    }

    async fn all(&self, plugin: &str) -> Result<SettingsMap> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            "SELECT name, value FROM plugin_config WHERE plugin = $1 ORDER BY name",
        )
        .bind(plugin)
        .fetch_all(&self.pool)
        .await
        .context("failed to list plugin settings")?;

        Ok(rows.into_iter().collect())
    }

    /// Apply the whole diff in one transaction so an interrupted upgrade
    /// never leaves half-renamed settings behind.
    async fn apply_diff(&self, plugin: &str, diff: &SettingsDiff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();

        for name in &diff.removed {
            sqlx::query("DELETE FROM plugin_config WHERE plugin = $1 AND name = $2")
                .bind(plugin)
                .bind(name)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to remove setting '{name}'"))?;
        }

        for (name, value) in &diff.written {
            sqlx::query(
                r#"
                INSERT INTO plugin_config (plugin, name, value, updated)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (plugin, name) DO UPDATE SET value = $3, updated = $4
                "#,
            )
            .bind(plugin)
            .bind(name)
            .bind(value.clone())
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to write setting '{name}'"))?;
        }

        tx.commit().await.context("failed to commit settings")?;

        debug!(
            plugin,
            removed = diff.removed.len(),
            written = diff.written.len(),
            "settings diff committed"
        );

        Ok(())
    }
}
