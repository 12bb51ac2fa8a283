#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests run against the bundled `themes/tessera` directory and against
//! throwaway themes written by `tessera-test-utils`. Postgres-backed tests
//! need `DATABASE_URL`; without it [`pg_store`] returns `None` and the
//! test returns early.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use tessera_kernel::store::PgSettingsStore;
use tessera_kernel::theme::Theme;

/// The theme shipped in the repository.
pub fn bundled_theme_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../themes/tessera")
}

pub fn bundled_theme() -> Theme {
    Theme::load(&bundled_theme_dir()).expect("bundled theme loads")
}

/// A theme name no other test in this process uses.
pub fn unique_theme_name(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "{prefix}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Connect to the test database, or `None` when `DATABASE_URL` is unset.
pub async fn pg_store() -> Option<PgSettingsStore> {
    let _ = dotenvy::dotenv();
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PgSettingsStore::connect(&url, 2)
        .await
        .expect("failed to connect to test database");
    store.ensure_schema().await.expect("schema");
    Some(store)
}

/// Remove every row of `plugin`.
pub async fn pg_cleanup(store: &PgSettingsStore, plugin: &str) {
    sqlx::query("DELETE FROM plugin_config WHERE plugin = $1")
        .bind(plugin)
        .execute(store.pool())
        .await
        .expect("cleanup");
}
