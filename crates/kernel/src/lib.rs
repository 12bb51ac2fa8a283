//! Tessera Kernel Library
//!
//! Theme settings migration: version-gated rename/convert/delete rules,
//! persisted settings stores, and properties bundle import/export.
//! The command-line entry point is the `tessera` binary.

pub mod cli;
pub mod config;
pub mod file;
pub mod migration;
pub mod pluginfile;
pub mod properties;
pub mod settings;
pub mod store;
pub mod theme;
