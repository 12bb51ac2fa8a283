//! Settings key migration.
//!
//! Rule tables rename, convert and delete settings as a theme evolves. Each
//! group of rules is gated by a feature-version threshold; an installation
//! records the highest version it has reached and only newer groups run.
//!
//! The same evaluator serves the live upgrade of persisted settings
//! ([`upgrade_store`]) and the in-memory migration of imported properties
//! bundles.

mod convert;
mod error;
mod evaluator;
mod rules;
mod upgrade;

pub use convert::{Converter, ConverterRegistry};
pub use error::{ConvertError, MigrationError};
pub use evaluator::{ChangeEntry, MigrationReport, apply_migrations};
pub use rules::{MigrationTable, RuleGroup, RuleKind, SettingRule};
pub use upgrade::{UpgradeOutcome, upgrade_store};
