#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for properties bundle export and import.

use serde_json::json;

mod common;

use tessera_kernel::file::{FileStorage, LocalFileStorage, area_uri};
use tessera_kernel::migration::upgrade_store;
use tessera_kernel::pluginfile::{rewrite_pluginfile_urls, setting_file_base};
use tessera_kernel::properties::{
    ImportMode, PropertiesBundle, export_properties, import_properties,
};
use tessera_kernel::store::{MemorySettingsStore, SettingsStore};
use tessera_test_utils::{assert, settings_map};

const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Settings and files exported from one site import cleanly into another.
#[tokio::test]
async fn export_then_import_into_empty_site() {
    let theme = common::bundled_theme();

    let source_store = MemorySettingsStore::new();
    source_store.set_feature_version("theme_tessera", 3).await.unwrap();
    source_store
        .set("theme_tessera", "headertoprowbkcolour", &json!("#123456"))
        .await
        .unwrap();
    source_store
        .set(
            "theme_tessera",
            "frontpagemarketing",
            &json!(r#"<img src="@@PLUGINFILE@@/banner.png">"#),
        )
        .await
        .unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    let source_files = LocalFileStorage::new(source_dir.path(), "/pluginfile");
    source_files
        .write(
            &area_uri("theme_tessera", "frontpagemarketing", "/", "banner.png").unwrap(),
            PNG_HEADER,
        )
        .await
        .unwrap();
    source_files
        .write(
            &area_uri("theme_tessera", "logo", "/", "logo.txt").unwrap(),
            b"logo",
        )
        .await
        .unwrap();

    let bundle = export_properties(&theme, &source_store, &source_files)
        .await
        .unwrap();
    assert_eq!(bundle.feature_version, 3);
    assert_eq!(bundle.version, "4.2.0");
    assert_eq!(bundle.file_count(), 2);
    assert_eq!(
        bundle.files["frontpagemarketing"][0].mimetype.as_deref(),
        Some("image/png")
    );

    let json = bundle.to_json().unwrap();
    let parsed = PropertiesBundle::from_json(&json, "theme_tessera").unwrap();
    assert_eq!(parsed, bundle);

    let target_store = MemorySettingsStore::new();
    let target_dir = tempfile::tempdir().unwrap();
    let target_files = LocalFileStorage::new(target_dir.path(), "/pluginfile");

    let report = import_properties(
        &theme,
        &target_store,
        &target_files,
        &parsed,
        ImportMode::Apply,
    )
    .await
    .unwrap();
    assert_eq!(report.changed.len(), 2);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.files.len(), 2);

    assert_eq!(
        target_store.settings("theme_tessera").await.unwrap(),
        source_store.settings("theme_tessera").await.unwrap()
    );
    assert_eq!(
        target_files
            .read("local://theme_tessera/frontpagemarketing/banner.png")
            .await
            .unwrap(),
        PNG_HEADER
    );
    assert_eq!(target_store.feature_version("theme_tessera").await.unwrap(), 3);
}

/// A legacy flat export from before any migrations imports with renames.
#[tokio::test]
async fn legacy_bundle_is_migrated_on_import() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::new();
    upgrade_store(&store, &theme).await.unwrap();

    let legacy = r##"{
        "headerbkcolor": "#112233",
        "blockheaderbordertop": "3px",
        "frontpagerenderer": "1",
        "somethingelse": "x",
        "theme_tessera_version": "2019052000"
    }"##;
    let bundle = PropertiesBundle::from_json(legacy, "theme_tessera").unwrap();
    assert_eq!(bundle.feature_version, 0);

    let dir = tempfile::tempdir().unwrap();
    let files = LocalFileStorage::new(dir.path(), "/pluginfile");
    let report = import_properties(&theme, &store, &files, &bundle, ImportMode::Apply)
        .await
        .unwrap();

    let lines = report.lines();
    assert::has_line(&lines, "Bundle migrated from feature version 0 to 3.");
    assert::has_line(&lines, "Setting 'frontpagerenderer' deleted");
    assert::has_line(&lines, "Setting 'somethingelse' ignored");
    assert_eq!(report.ignored, vec!["somethingelse".to_string()]);

    assert_eq!(
        store.settings("theme_tessera").await.unwrap(),
        settings_map(&[
            ("blockheaderbordertop", json!(3)),
            ("headertoprowbkcolour", json!("#112233")),
        ])
    );
}

/// Comparing reports differences against the live values and writes nothing.
#[tokio::test]
async fn compare_reports_without_writing() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::new();
    store.set_feature_version("theme_tessera", 3).await.unwrap();
    store
        .set("theme_tessera", "headertoprowbkcolour", &json!("#000000"))
        .await
        .unwrap();
    store
        .set("theme_tessera", "customcss", &json!("body {}"))
        .await
        .unwrap();
    let before = store.all("theme_tessera").await.unwrap();

    let bundle = PropertiesBundle {
        component: "theme_tessera".to_string(),
        version: "4.2.0".to_string(),
        feature_version: 3,
        settings: settings_map(&[
            ("headertoprowbkcolour", json!("#ffffff")),
            ("customcss", json!("body {}")),
        ]),
        files: Default::default(),
    };

    let dir = tempfile::tempdir().unwrap();
    let files = LocalFileStorage::new(dir.path(), "/pluginfile");
    let report = import_properties(&theme, &store, &files, &bundle, ImportMode::Compare)
        .await
        .unwrap();

    assert::has_line(
        &report.lines(),
        "Setting 'headertoprowbkcolour' changed from '#000000' to '#ffffff'.",
    );
    assert_eq!(report.unchanged, vec!["customcss".to_string()]);
    assert_eq!(store.all("theme_tessera").await.unwrap(), before);
}

/// A bundle for another theme is refused.
#[tokio::test]
async fn bundle_for_other_component_is_refused() {
    let theme = common::bundled_theme();
    let store = MemorySettingsStore::new();
    let dir = tempfile::tempdir().unwrap();
    let files = LocalFileStorage::new(dir.path(), "/pluginfile");

    let json = r#"{"component": "theme_classic", "feature_version": 1, "settings": {}}"#;
    let bundle = PropertiesBundle::from_json(json, "theme_tessera").unwrap();

    let err = import_properties(&theme, &store, &files, &bundle, ImportMode::Apply)
        .await
        .unwrap_err();
    assert::contains(&err.to_string(), "theme_classic");
}

/// Html saved on one site carries tokens, so it resolves against the
/// file URL of the site it is imported into.
#[tokio::test]
async fn saved_html_links_follow_the_site() {
    let theme = common::bundled_theme();

    let source_store = MemorySettingsStore::new();
    upgrade_store(&source_store, &theme).await.unwrap();
    let source_dir = tempfile::tempdir().unwrap();
    let source_files = LocalFileStorage::new(source_dir.path(), "https://old.example/pluginfile");
    source_files
        .write(
            &area_uri("theme_tessera", "footnote", "/", "seal.png").unwrap(),
            PNG_HEADER,
        )
        .await
        .unwrap();

    let saved = theme
        .save_setting(
            &source_store,
            &source_files,
            "footnote",
            r#"<img src="https://old.example/pluginfile/theme_tessera/footnote/seal.png">"#,
        )
        .await
        .unwrap();
    assert!(saved.missing_files.is_empty());

    let bundle = export_properties(&theme, &source_store, &source_files)
        .await
        .unwrap();
    assert_eq!(
        bundle.settings["footnote"],
        json!(r#"<img src="@@PLUGINFILE@@/seal.png">"#)
    );

    let target_store = MemorySettingsStore::new();
    let target_dir = tempfile::tempdir().unwrap();
    let target_files = LocalFileStorage::new(target_dir.path(), "/files");
    let report = import_properties(
        &theme,
        &target_store,
        &target_files,
        &bundle,
        ImportMode::Apply,
    )
    .await
    .unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let stored = target_store.settings("theme_tessera").await.unwrap();
    let html = stored["footnote"].as_str().unwrap();
    let base = setting_file_base(&target_files, "theme_tessera", "footnote");
    assert_eq!(
        rewrite_pluginfile_urls(html, &base),
        r#"<img src="/files/theme_tessera/footnote/seal.png">"#
    );
}
