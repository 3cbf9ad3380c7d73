//! Per-connection operation results

use chrono::{DateTime, Utc};
use std::time::Instant;

use crate::error::Error;

/// Outcome of one operation on one connection
#[derive(Debug)]
pub struct OperationResult<T = ()> {
    pub connection_id: String,
    pub success: bool,
    /// Wall time of the operation in seconds
    pub time_elapsed: f64,
    pub started_at: DateTime<Utc>,
    pub data: Option<T>,
    pub error: Option<Error>,
}

impl<T> OperationResult<T> {
    /// Finalize a result from the outcome of an operation
    pub fn from_outcome(
        connection_id: &str,
        timer: &OperationTimer,
        outcome: Result<T, Error>,
    ) -> Self {
        let (success, data, error) = match outcome {
            Ok(data) => (true, Some(data), None),
            Err(error) => (false, None, Some(error)),
        };

        Self {
            connection_id: connection_id.to_string(),
            success,
            time_elapsed: timer.elapsed_seconds(),
            started_at: timer.started_at,
            data,
            error,
        }
    }
}

/// Start time of an operation
#[derive(Debug, Clone, Copy)]
pub struct OperationTimer {
    pub started_at: DateTime<Utc>,
    instant: Instant,
}

impl OperationTimer {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            instant: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.instant.elapsed().as_secs_f64()
    }
}

/// Success and failure counts over a batch of results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl ResultSummary {
    pub fn of<T>(results: &[OperationResult<T>]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
