//! Migration error types.
//!
//! Errors name the rule and key involved so an administrator reading an
//! aborted upgrade can find the offending entry in the rule table.

use thiserror::Error;

/// A value conversion refused its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConvertError(pub String);

impl ConvertError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised while loading a rule table or running a migration pass.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A rule references a converter that is not registered.
    #[error("group {threshold}: rule for '{from}' uses unknown converter '{converter}'. Known converters: {known}")]
    UnknownConverter {
        threshold: u32,
        from: String,
        converter: String,
        known: String,
    },

    /// A rule is malformed (empty key, rename onto itself, ...).
    #[error("group {threshold}: invalid rule for '{from}': {details}")]
    InvalidRule {
        threshold: u32,
        from: String,
        details: String,
    },

    /// Group thresholds must strictly increase in declaration order.
    #[error("group threshold {threshold} does not follow previous threshold {previous}")]
    ThresholdOrder { previous: u32, threshold: u32 },

    /// The rule table could not be parsed.
    #[error("failed to parse migration table: {details}")]
    InvalidTable { details: String },

    /// A converter failed. Fatal to the whole pass.
    #[error("group {threshold}: converting '{key}' with '{converter}' failed: {source}")]
    ConversionFailed {
        threshold: u32,
        key: String,
        converter: String,
        #[source]
        source: ConvertError,
    },
}

impl MigrationError {
    /// Create an invalid rule error.
    pub fn invalid_rule(threshold: u32, from: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidRule {
            threshold,
            from: from.into(),
            details: details.into(),
        }
    }

    /// Create an unknown converter error listing the registered names.
    pub fn unknown_converter(
        threshold: u32,
        from: impl Into<String>,
        converter: impl Into<String>,
        known: &[&str],
    ) -> Self {
        Self::UnknownConverter {
            threshold,
            from: from.into(),
            converter: converter.into(),
            known: known.join(", "),
        }
    }
}
