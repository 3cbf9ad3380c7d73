//! Utilities
//!
//! Object path naming and logging setup.

pub mod logging;
pub mod naming;

pub use naming::{is_drop_only, object_name, resolve_object_info};
