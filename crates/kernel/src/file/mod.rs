//! Setting file areas.
//!
//! Files attached to `file` and `html` settings live in one area per
//! setting, addressed by storage URIs.

pub mod storage;

pub use storage::{FileStorage, LocalFileStorage, area_prefix, area_uri, split_area_uri};
