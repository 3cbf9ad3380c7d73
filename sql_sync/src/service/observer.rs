//! Lifecycle notifications
//!
//! The orchestrator reports state transitions of every connection to a
//! [`SyncObserver`]. Observers are for presentation only; every method has a
//! no-op default.

use crate::error::Error;

#[allow(unused_variables)]
pub trait SyncObserver: Send + Sync {
    /// A connection's operation started
    fn on_started(&self, connection_id: &str) {}

    /// Previously synchronized objects were dropped
    fn on_teardown_success(&self, connection_id: &str, time_elapsed: f64) {}

    /// Pending migrations ran
    fn on_migration_success(&self, connection_id: &str, applied: &[String]) {}

    fn on_migration_failed(&self, connection_id: &str, error: &Error) {}

    /// The whole operation completed (committed, or rolled back under dry run)
    fn on_success(&self, connection_id: &str, time_elapsed: f64) {}

    fn on_failed(&self, connection_id: &str, error: &Error) {}
}

/// Observer ignoring every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
