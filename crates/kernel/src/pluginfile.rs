//! `@@PLUGINFILE@@` tokens in rich-text settings.
//!
//! Stored html refers to files of its own file area through the token, which
//! is rewritten to a public URL for display and back to the token on save.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::file::{FileStorage, area_prefix};

/// Placeholder for the base URL of a setting's file area.
pub const PLUGINFILE_TOKEN: &str = "@@PLUGINFILE@@";

#[allow(clippy::expect_used)]
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@@PLUGINFILE@@/([^"'\s<>()]+)"#).expect("valid regex literal")
});

/// Public base URL of a setting's file area, without a trailing slash.
pub fn setting_file_base(files: &dyn FileStorage, component: &str, setting: &str) -> String {
    files
        .public_url(&area_prefix(component, setting))
        .trim_end_matches('/')
        .to_string()
}

/// Replace every token with `base_url`.
pub fn rewrite_pluginfile_urls(text: &str, base_url: &str) -> String {
    text.replace(PLUGINFILE_TOKEN, base_url.trim_end_matches('/'))
}

/// Turn absolute links into the file area back into tokens.
///
/// `base_url` matches with or without a trailing slash, but only as a whole
/// path segment, so a base of `/files/logo` leaves `/files/logos` alone.
pub fn encode_pluginfile_urls(text: &str, base_url: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    if base.is_empty() {
        return Ok(text.to_string());
    }

    let pattern = format!(r#"{}(/|["'\s<>()]|$)"#, regex::escape(base));
    let re = Regex::new(&pattern).with_context(|| format!("cannot match base URL '{base}'"))?;
    Ok(re
        .replace_all(text, format!("{PLUGINFILE_TOKEN}$1").as_str())
        .into_owned())
}

/// Paths of the files `text` refers to through the token.
///
/// Paths are relative to the file area, URL-decoded and stripped of any
/// query string or fragment.
pub fn referenced_files(text: &str) -> BTreeSet<String> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let raw = m.as_str();
            let raw = raw.split(['?', '#']).next().unwrap_or(raw);
            match urlencoding::decode(raw) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => raw.to_string(),
            }
        })
        .filter(|path| !path.is_empty())
        .collect()
}
