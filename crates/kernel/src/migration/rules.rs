//! Rule tables: version-gated groups of rename, convert and delete rules.
//!
//! Tables are plain data and load from TOML:
//!
//! ```toml
//! [[group]]
//! threshold = 2
//! description = "header row split"
//!
//! [[group.rule]]
//! kind = "rename"
//! from = "headerbkcolor"
//! to = "headertoprowbkcolour"
//!
//! [[group.rule]]
//! kind = "convert"
//! from = "blockheaderbordertop"
//! convert = "int"
//!
//! [[group.rule]]
//! kind = "delete"
//! from = "frontpagerenderer"
//! ```
//!
//! `kind` may be omitted, in which case it is inferred from the shape of the
//! rule: no `to` deletes, `to == from` with `convert` converts in place, any
//! other `to` renames.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::convert::ConverterRegistry;
use super::error::MigrationError;

/// What a rule does to its `from` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Move the value to `to`, optionally converting it.
    Rename { to: String, convert: Option<String> },

    /// Replace the value in place with the converted value.
    Convert { convert: String },

    /// Remove the key.
    Delete,
}

/// A single migration rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRule {
    pub from: String,
    pub kind: RuleKind,
}

impl SettingRule {
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind: RuleKind::Rename {
                to: to.into(),
                convert: None,
            },
        }
    }

    pub fn rename_with(
        from: impl Into<String>,
        to: impl Into<String>,
        convert: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            kind: RuleKind::Rename {
                to: to.into(),
                convert: Some(convert.into()),
            },
        }
    }

    pub fn convert(key: impl Into<String>, convert: impl Into<String>) -> Self {
        Self {
            from: key.into(),
            kind: RuleKind::Convert {
                convert: convert.into(),
            },
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            from: key.into(),
            kind: RuleKind::Delete,
        }
    }

    /// Build a rule from the untagged `{from, to?, convert?}` shape.
    ///
    /// Returns `None` for `to == from` without a converter, which would
    /// describe a rule that does nothing.
    pub fn infer(from: &str, to: Option<&str>, convert: Option<&str>) -> Option<Self> {
        match (to, convert) {
            (None, _) => Some(Self::delete(from)),
            (Some(to), Some(convert)) if to == from => Some(Self::convert(from, convert)),
            (Some(to), None) if to == from => None,
            (Some(to), convert) => Some(Self {
                from: from.to_string(),
                kind: RuleKind::Rename {
                    to: to.to_string(),
                    convert: convert.map(String::from),
                },
            }),
        }
    }

    /// Destination key, if the rule moves the value.
    pub fn to(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Rename { to, .. } => Some(to),
            _ => None,
        }
    }

    /// Converter name, if any.
    pub fn converter(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Rename { convert, .. } => convert.as_deref(),
            RuleKind::Convert { convert } => Some(convert),
            RuleKind::Delete => None,
        }
    }

    fn validate(&self, threshold: u32, converters: &ConverterRegistry) -> Result<(), MigrationError> {
        if self.from.trim().is_empty() {
            return Err(MigrationError::invalid_rule(threshold, &self.from, "empty 'from' key"));
        }

        if let RuleKind::Rename { to, .. } = &self.kind {
            if to.trim().is_empty() {
                return Err(MigrationError::invalid_rule(threshold, &self.from, "empty 'to' key"));
            }
            if to == &self.from {
                return Err(MigrationError::invalid_rule(
                    threshold,
                    &self.from,
                    "rename onto itself; use kind = \"convert\" for in-place conversion",
                ));
            }
        }

        if let Some(name) = self.converter() {
            if !converters.contains(name) {
                return Err(MigrationError::unknown_converter(
                    threshold,
                    &self.from,
                    name,
                    &converters.names(),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Display for SettingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RuleKind::Rename { to, convert: None } => write!(f, "rename '{}' to '{to}'", self.from),
            RuleKind::Rename {
                to,
                convert: Some(convert),
            } => write!(f, "rename '{}' to '{to}' via {convert}", self.from),
            RuleKind::Convert { convert } => write!(f, "convert '{}' via {convert}", self.from),
            RuleKind::Delete => write!(f, "delete '{}'", self.from),
        }
    }
}

/// Rules that run while the installation's feature version is below
/// `threshold`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    pub threshold: u32,
    pub description: Option<String>,
    pub rules: Vec<SettingRule>,
}

impl RuleGroup {
    pub fn new(threshold: u32, rules: Vec<SettingRule>) -> Self {
        Self {
            threshold,
            description: None,
            rules,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether this group must still run for `feature_version`.
    pub fn is_pending(&self, feature_version: u32) -> bool {
        feature_version < self.threshold
    }
}

/// An ordered list of rule groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationTable {
    groups: Vec<RuleGroup>,
}

impl MigrationTable {
    /// Build a table without validating it. See [`MigrationTable::validate`].
    pub fn new(groups: Vec<RuleGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of rules across all groups.
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }

    /// Highest threshold in the table, 0 when empty.
    pub fn latest_version(&self) -> u32 {
        self.groups.iter().map(|g| g.threshold).max().unwrap_or(0)
    }

    /// Groups that still run for `feature_version`, in declaration order.
    pub fn pending_groups(&self, feature_version: u32) -> impl Iterator<Item = &RuleGroup> {
        self.groups
            .iter()
            .filter(move |g| g.is_pending(feature_version))
    }

    /// Check rule shapes, threshold ordering and converter names.
    pub fn validate(&self, converters: &ConverterRegistry) -> Result<(), MigrationError> {
        let mut previous: Option<u32> = None;
        for group in &self.groups {
            if let Some(previous) = previous {
                if group.threshold <= previous {
                    return Err(MigrationError::ThresholdOrder {
                        previous,
                        threshold: group.threshold,
                    });
                }
            }
            previous = Some(group.threshold);

            for rule in &group.rules {
                rule.validate(group.threshold, converters)?;
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML rule table.
    pub fn from_toml_str(content: &str, converters: &ConverterRegistry) -> Result<Self, MigrationError> {
        let def: TableDef = toml::from_str(content).map_err(|e| MigrationError::InvalidTable {
            details: e.to_string(),
        })?;

        let mut groups = Vec::with_capacity(def.groups.len());
        for group in def.groups {
            let mut rules = Vec::with_capacity(group.rules.len());
            for rule in group.rules {
                rules.push(rule.into_rule(group.threshold)?);
            }
            groups.push(RuleGroup {
                threshold: group.threshold,
                description: group.description,
                rules,
            });
        }

        let table = Self { groups };
        table.validate(converters)?;
        Ok(table)
    }

    /// Load and validate a TOML rule table from disk.
    pub fn load(path: &Path, converters: &ConverterRegistry) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read migration table: {}", path.display()))?;

        Self::from_toml_str(&content, converters)
            .with_context(|| format!("invalid migration table at {}", path.display()))
    }

    /// Serialize the table back to TOML with explicit `kind` tags.
    pub fn to_toml_string(&self) -> Result<String, MigrationError> {
        let def = TableDef {
            groups: self
                .groups
                .iter()
                .map(|g| GroupDef {
                    threshold: g.threshold,
                    description: g.description.clone(),
                    rules: g.rules.iter().map(RuleDef::from).collect(),
                })
                .collect(),
        };

        toml::to_string_pretty(&def).map_err(|e| MigrationError::InvalidTable {
            details: e.to_string(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct TableDef {
    #[serde(default, rename = "group")]
    groups: Vec<GroupDef>,
}

#[derive(Serialize, Deserialize)]
struct GroupDef {
    threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindTag {
    Rename,
    Convert,
    Delete,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<KindTag>,
    from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    convert: Option<String>,
}

impl RuleDef {
    fn into_rule(self, threshold: u32) -> Result<SettingRule, MigrationError> {
        let Some(kind) = self.kind else {
            return SettingRule::infer(&self.from, self.to.as_deref(), self.convert.as_deref())
                .ok_or_else(|| {
                    MigrationError::invalid_rule(
                        threshold,
                        &self.from,
                        "'to' equals 'from' without a converter",
                    )
                });
        };

        match kind {
            KindTag::Rename => {
                let to = self.to.ok_or_else(|| {
                    MigrationError::invalid_rule(threshold, &self.from, "rename without 'to'")
                })?;
                Ok(SettingRule {
                    from: self.from,
                    kind: RuleKind::Rename {
                        to,
                        convert: self.convert,
                    },
                })
            }
            KindTag::Convert => {
                if self.to.as_ref().is_some_and(|to| to != &self.from) {
                    return Err(MigrationError::invalid_rule(
                        threshold,
                        &self.from,
                        "convert rules must not name a different 'to'",
                    ));
                }
                let convert = self.convert.ok_or_else(|| {
                    MigrationError::invalid_rule(threshold, &self.from, "convert without 'convert'")
                })?;
                Ok(SettingRule::convert(self.from, convert))
            }
            KindTag::Delete => {
                if self.to.is_some() || self.convert.is_some() {
                    return Err(MigrationError::invalid_rule(
                        threshold,
                        &self.from,
                        "delete rules take only 'from'",
                    ));
                }
                Ok(SettingRule::delete(self.from))
            }
        }
    }
}

impl From<&SettingRule> for RuleDef {
    fn from(rule: &SettingRule) -> Self {
        match &rule.kind {
            RuleKind::Rename { to, convert } => Self {
                kind: Some(KindTag::Rename),
                from: rule.from.clone(),
                to: Some(to.clone()),
                convert: convert.clone(),
            },
            RuleKind::Convert { convert } => Self {
                kind: Some(KindTag::Convert),
                from: rule.from.clone(),
                to: None,
                convert: Some(convert.clone()),
            },
            RuleKind::Delete => Self {
                kind: Some(KindTag::Delete),
                from: rule.from.clone(),
                to: None,
                convert: None,
            },
        }
    }
}
