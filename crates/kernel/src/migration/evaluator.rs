//! The rule evaluator.
//!
//! Brings a settings map up to date by running every rule group whose
//! threshold is above the map's feature version, in declaration order.
//! Later rules may read keys that earlier rules in the same pass created.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::convert::ConverterRegistry;
use super::error::MigrationError;
use super::rules::{MigrationTable, RuleKind, SettingRule};
use crate::settings::{SettingsMap, display_value};

/// One change made by a fired rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeEntry {
    /// `key` was removed.
    Deleted { key: String, value: Value },

    /// `key` was converted in place.
    ValueChanged { key: String, old: Value, new: Value },

    /// `from` moved to `to`, carrying `value` (already converted).
    Renamed { from: String, to: String, value: Value },

    /// `to` already existed; `from` was dropped and its value discarded.
    Conflict {
        from: String,
        to: String,
        kept: Value,
        discarded: Value,
    },
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted { key, value } => write!(
                f,
                "Setting '{key}' deleted (value was '{}').",
                display_value(value)
            ),
            Self::ValueChanged { key, old, new } => write!(
                f,
                "Setting '{key}' value changed from '{}' to '{}'.",
                display_value(old),
                display_value(new)
            ),
            Self::Renamed { from, to, value } => write!(
                f,
                "Setting '{from}' renamed to '{to}' with value '{}'.",
                display_value(value)
            ),
            Self::Conflict {
                from,
                to,
                kept,
                discarded,
            } => write!(
                f,
                "Setting '{to}' already defined with value '{}', ignoring old setting '{from}' with value '{}'.",
                display_value(kept),
                display_value(discarded)
            ),
        }
    }
}

/// Outcome of a migration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Feature version the map was migrated from.
    pub from_version: u32,

    /// Feature version reached: the input, or the highest threshold that ran.
    pub feature_version: u32,

    /// Thresholds of the groups that ran, in order.
    pub groups_applied: Vec<u32>,

    /// One entry per rule that fired, in firing order.
    pub entries: Vec<ChangeEntry>,
}

impl MigrationReport {
    /// True when no rule changed anything.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the feature version moved.
    pub fn advanced(&self) -> bool {
        self.feature_version > self.from_version
    }

    /// Human-readable change log.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

/// Migrate `map` from `feature_version` using `table`.
///
/// Missing source keys are skipped. A failing converter aborts the pass with
/// [`MigrationError::ConversionFailed`]; the map may then hold a partial
/// result and must be discarded by the caller.
pub fn apply_migrations(
    map: &mut SettingsMap,
    feature_version: u32,
    table: &MigrationTable,
    converters: &ConverterRegistry,
) -> Result<MigrationReport, MigrationError> {
    let mut report = MigrationReport {
        from_version: feature_version,
        feature_version,
        ..Default::default()
    };

    for group in table.pending_groups(feature_version) {
        debug!(
            threshold = group.threshold,
            rules = group.rules.len(),
            "applying rule group"
        );

        for rule in &group.rules {
            if let Some(entry) = apply_rule(map, rule, group.threshold, converters)? {
                debug!(threshold = group.threshold, change = %entry, "rule fired");
                report.entries.push(entry);
            }
        }

        report.groups_applied.push(group.threshold);
        report.feature_version = report.feature_version.max(group.threshold);
    }

    if !report.groups_applied.is_empty() {
        info!(
            from = report.from_version,
            to = report.feature_version,
            groups = report.groups_applied.len(),
            changes = report.entries.len(),
            "settings migrated"
        );
    }

    Ok(report)
}

fn apply_rule(
    map: &mut SettingsMap,
    rule: &SettingRule,
    threshold: u32,
    converters: &ConverterRegistry,
) -> Result<Option<ChangeEntry>, MigrationError> {
    let Some(old) = map.get(&rule.from).cloned() else {
        return Ok(None);
    };

    let convert = |name: &str, value: &Value| {
        converters
            .convert(name, value)
            .map_err(|source| MigrationError::ConversionFailed {
                threshold,
                key: rule.from.clone(),
                converter: name.to_string(),
                source,
            })
    };

    match &rule.kind {
        RuleKind::Delete => {
            map.remove(&rule.from);
            Ok(Some(ChangeEntry::Deleted {
                key: rule.from.clone(),
                value: old,
            }))
        }
        RuleKind::Convert { convert: name } => {
            let new = convert(name.as_str(), &old)?;
            if new == old {
                return Ok(None);
            }
            map.insert(rule.from.clone(), new.clone());
            Ok(Some(ChangeEntry::ValueChanged {
                key: rule.from.clone(),
                old,
                new,
            }))
        }
        RuleKind::Rename { to, convert: name } => {
            if let Some(kept) = map.get(to).cloned() {
                // The stale key is still dropped so it is not later reported
                // as an unrecognised setting.
                map.remove(&rule.from);
                return Ok(Some(ChangeEntry::Conflict {
                    from: rule.from.clone(),
                    to: to.clone(),
                    kept,
                    discarded: old,
                }));
            }

            let value = match name {
                Some(name) => convert(name.as_str(), &old)?,
                None => old,
            };
            map.remove(&rule.from);
            map.insert(to.clone(), value.clone());
            Ok(Some(ChangeEntry::Renamed {
                from: rule.from.clone(),
                to: to.clone(),
                value,
            }))
        }
    }
}
