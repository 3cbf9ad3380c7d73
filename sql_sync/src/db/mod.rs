//! Database access
//!
//! Connection descriptors and pools, the transaction executor every operation
//! runs its statements through, and migration bookkeeping.

pub mod connection;
pub mod executor;
pub mod migrations;

pub use connection::{ConnectionDescriptor, DatabaseConnection, DriverKind};
pub use executor::{SqlExecutor, SyncTransaction};
