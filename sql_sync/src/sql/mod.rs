//! SQL source handling
//!
//! Loading object source files and running them against a transaction.

pub mod loader;
pub mod runner;
pub mod types;

// Re-export key types
pub use types::{ObjectType, SourceTree, SqlCode, SqlFileInfo};
