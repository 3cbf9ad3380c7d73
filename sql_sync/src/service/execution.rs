//! Execution strategies
//!
//! Runs one process per connection either one after another or concurrently.
//! Concurrent processes are joined on the calling task, so "parallel" means
//! interleaved I/O rather than extra threads. A failing process never cancels
//! the others.

use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How the processes of several connections are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutionStrategy {
    /// Connection N+1 starts once connection N has finished
    #[default]
    Sequential,
    /// All connections run concurrently
    Parallel,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel => "parallel",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            other => Err(Error::ConfigError(format!(
                "Execution strategy should be either \"sequential\" or \"parallel\", found: \"{}\"",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ExecutionStrategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ExecutionStrategy> for String {
    fn from(strategy: ExecutionStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// Run processes with the given strategy.
///
/// Results are returned in the order of `processes` whatever the order in
/// which they complete.
pub async fn execute_processes<'a, T>(
    processes: Vec<BoxFuture<'a, T>>,
    strategy: ExecutionStrategy,
) -> Vec<T> {
    tracing::debug!(count = processes.len(), %strategy, "Executing processes");

    match strategy {
        ExecutionStrategy::Sequential => {
            let mut results = Vec::with_capacity(processes.len());
            for process in processes {
                results.push(process.await);
            }
            results
        }
        ExecutionStrategy::Parallel => join_all(processes).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn delayed(
        index: usize,
        delay_ms: u64,
        events: Arc<Mutex<Vec<String>>>,
    ) -> BoxFuture<'static, usize> {
        async move {
            events.lock().unwrap().push(format!("start {}", index));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            events.lock().unwrap().push(format!("end {}", index));
            index
        }
        .boxed()
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("sequential".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Sequential);
        assert_eq!("parallel".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Parallel);
        assert!(matches!(
            "random".parse::<ExecutionStrategy>(),
            Err(Error::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_sequential_runs_one_after_another() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let processes = vec![
            delayed(0, 30, events.clone()),
            delayed(1, 5, events.clone()),
            delayed(2, 15, events.clone()),
        ];

        let results = execute_processes(processes, ExecutionStrategy::Sequential).await;

        assert_eq!(results, vec![0, 1, 2]);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
        );
    }

    #[tokio::test]
    async fn test_parallel_preserves_index_mapping() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let processes = vec![
            delayed(0, 60, events.clone()),
            delayed(1, 5, events.clone()),
            delayed(2, 30, events.clone()),
        ];

        let results = execute_processes(processes, ExecutionStrategy::Parallel).await;

        assert_eq!(results, vec![0, 1, 2]);

        let events = events.lock().unwrap();
        // Every process starts before any of them finishes
        assert!(events[..3].iter().all(|e| e.starts_with("start")));
        assert_eq!(events[3], "end 1");
    }
}
