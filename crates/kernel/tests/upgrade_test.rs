#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the live settings upgrade.
//!
//! Runs the bundled theme's rule table against the memory and YAML stores.

use serde_json::json;

mod common;

use tessera_kernel::migration::upgrade_store;
use tessera_kernel::store::{MemorySettingsStore, SettingsStore, YamlSettingsStore};
use tessera_kernel::theme::Theme;
use tessera_test_utils::{assert, settings_map, test_theme};

/// A fresh installation of an old release upgrades in one pass.
#[tokio::test]
async fn upgrade_bundled_theme_from_scratch() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::with_settings(
        "theme_tessera",
        settings_map(&[
            ("headerbkcolor", json!("#112233")),
            ("blockheaderbordertop", json!("2px")),
            ("blockheaderbordertopstyle2", json!("DASHED")),
            ("frontpagerenderer", json!("2")),
            ("fontawesome", json!("yes")),
        ]),
    );

    let outcome = upgrade_store(&store, &theme).await.expect("upgrade");
    assert_eq!(outcome.from_version, 0);
    assert_eq!(outcome.to_version, theme.feature_version());
    assert_eq!(outcome.report.groups_applied, vec![1, 2, 3]);

    let lines = outcome.report.lines();
    assert::has_line(
        &lines,
        "Setting 'headerbkcolor' renamed to 'headertoprowbkcolour' with value '#112233'.",
    );
    assert::has_line(
        &lines,
        "Setting 'blockheaderbordertop' value changed from '2px' to '2'.",
    );
    assert::has_line(&lines, "Setting 'frontpagerenderer' deleted");

    let settings = store.settings("theme_tessera").await.unwrap();
    assert_eq!(
        settings,
        settings_map(&[
            ("blockheaderbordertop", json!(2)),
            ("blockheaderbordertopstyle", json!("dashed")),
            ("headertoprowbkcolour", json!("#112233")),
            ("usefontawesome", json!(true)),
        ])
    );
    assert_eq!(store.feature_version("theme_tessera").await.unwrap(), 3);
}

/// An already-set new key wins over the old one.
#[tokio::test]
async fn conflicting_rename_keeps_new_value() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::with_settings(
        "theme_tessera",
        settings_map(&[
            ("headerbkcolor", json!("#112233")),
            ("headertoprowbkcolour", json!("#445566")),
        ]),
    );

    let outcome = upgrade_store(&store, &theme).await.unwrap();
    assert::has_line(
        &outcome.report.lines(),
        "Setting 'headertoprowbkcolour' already defined with value '#445566', ignoring old setting 'headerbkcolor' with value '#112233'.",
    );

    let settings = store.settings("theme_tessera").await.unwrap();
    assert_eq!(settings, settings_map(&[("headertoprowbkcolour", json!("#445566"))]));
}

/// A bad value stops the upgrade and leaves the store as it was.
#[tokio::test]
async fn failed_conversion_leaves_store_untouched() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::with_settings(
        "theme_tessera",
        settings_map(&[
            ("headerbkcolor", json!("#112233")),
            ("blockheaderbordertop", json!("thick")),
        ]),
    );
    let before = store.all("theme_tessera").await.unwrap();

    let err = upgrade_store(&store, &theme).await.unwrap_err();
    assert::contains(&format!("{err:#}"), "blockheaderbordertop");
    assert_eq!(store.all("theme_tessera").await.unwrap(), before);
}

/// Upgrades persist through the YAML store and survive a reopen.
#[tokio::test]
async fn yaml_store_upgrade_persists() {
    let dir = tempfile::tempdir().unwrap();
    let theme = common::bundled_theme();

    {
        let store = YamlSettingsStore::new(dir.path());
        store
            .set("theme_tessera", "headerbkcolor", &json!("#abcdef"))
            .await
            .unwrap();
        let outcome = upgrade_store(&store, &theme).await.unwrap();
        assert!(outcome.wrote());
    }

    let reopened = YamlSettingsStore::new(dir.path());
    assert_eq!(reopened.feature_version("theme_tessera").await.unwrap(), 3);
    assert_eq!(
        reopened
            .get("theme_tessera", "headertoprowbkcolour")
            .await
            .unwrap(),
        Some(json!("#abcdef"))
    );

    let again = upgrade_store(&reopened, &theme).await.unwrap();
    assert!(!again.wrote());
}

/// A newer release adds a group; only that group runs on the next upgrade.
#[tokio::test]
async fn new_release_runs_only_its_group() {
    let root = tempfile::tempdir().unwrap();
    let v1 = test_theme("evolving")
        .with_feature_version(1)
        .with_setting("linkcolour", "colour")
        .group(1)
        .rename("linkcolor", "linkcolour");
    let dir = v1.write_to(root.path()).unwrap();

    let store = MemorySettingsStore::new();
    store
        .set("theme_evolving", "linkcolor", &json!("#0000ff"))
        .await
        .unwrap();
    upgrade_store(&store, &Theme::load(&dir).unwrap())
        .await
        .unwrap();

    // Someone sets the old key again after the first upgrade.
    store
        .set("theme_evolving", "linkcolor", &json!("#ff0000"))
        .await
        .unwrap();

    let v2 = v1
        .with_feature_version(2)
        .with_setting("bordercolour", "colour")
        .group(2)
        .rename("bordercolor", "bordercolour");
    v2.write_to(root.path()).unwrap();
    store
        .set("theme_evolving", "bordercolor", &json!("#cccccc"))
        .await
        .unwrap();

    let outcome = upgrade_store(&store, &Theme::load(&dir).unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.report.groups_applied, vec![2]);

    let settings = store.settings("theme_evolving").await.unwrap();
    assert_eq!(settings["linkcolor"], json!("#ff0000"));
    assert_eq!(settings["linkcolour"], json!("#0000ff"));
    assert_eq!(settings["bordercolour"], json!("#cccccc"));
}

/// The watermark never goes backwards.
#[tokio::test]
async fn store_ahead_of_theme_is_left_alone() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::new();
    store.set_feature_version("theme_tessera", 9).await.unwrap();
    store
        .set("theme_tessera", "headerbkcolor", &json!("#112233"))
        .await
        .unwrap();

    let outcome = upgrade_store(&store, &theme).await.unwrap();
    assert!(!outcome.wrote());
    assert_eq!(outcome.to_version, 9);
    assert_eq!(store.feature_version("theme_tessera").await.unwrap(), 9);
}
