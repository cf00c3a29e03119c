//! Concurrent partition fan-out with per-partition timeout, bounded retry
//! and failure isolation.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rxsearch_core::{PartitionQuery, RankedDrug};
use rxsearch_store::{Partition, PartitionSet, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::config::CallPolicy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionFailure {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: String,
    pub result: Result<Vec<RankedDrug>, PartitionFailure>,
}

impl PartitionOutcome {
    pub fn is_ok(&self) -> bool { self.result.is_ok() }
}

// Errors that a retry cannot fix.
fn permanent(e: &StoreError) -> bool {
    matches!(e, StoreError::Pattern(_) | StoreError::Closed(_) | StoreError::Empty)
}

/// Run `op` under the call policy. Timeouts and transient errors are retried
/// with doubling backoff up to `policy.retries` extra attempts.
pub async fn call_with_policy<T, F, Fut>(partition: &str, policy: &CallPolicy, op: F) -> Result<T, PartitionFailure>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let failure = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(v)) => return Ok(v),
            Ok(Err(e)) if permanent(&e) => return Err(PartitionFailure::Failed(e.to_string())),
            Ok(Err(e)) => PartitionFailure::Failed(e.to_string()),
            Err(_) => {
                metrics::counter!("search_partition_timeouts_total", 1u64, "partition" => partition.to_string());
                PartitionFailure::TimedOut(policy.timeout)
            }
        };
        if attempt >= policy.retries {
            return Err(failure);
        }
        let delay = policy.backoff.saturating_mul(1u32 << attempt.min(16));
        attempt += 1;
        debug!(partition, attempt, delay_ms = %delay.as_millis(), error = %failure, "retrying partition call");
        tokio::time::sleep(delay).await;
    }
}

async fn search_one(p: &Arc<dyn Partition>, query: &PartitionQuery, policy: &CallPolicy) -> PartitionOutcome {
    let started = Instant::now();
    let name = p.name().to_string();
    let result = call_with_policy(&name, policy, || p.search(query)).await;
    let took_ms = started.elapsed().as_secs_f64() * 1_000.0;
    metrics::histogram!("search_partition_ms", took_ms, "partition" => name.clone());
    match &result {
        Ok(hits) => debug!(partition = %name, hits = hits.len(), took_ms, "partition ok"),
        Err(e) => {
            metrics::counter!("search_partition_failures_total", 1u64, "partition" => name.clone());
            warn!(partition = %name, error = %e, took_ms, "partition failed; contributing no results");
        }
    }
    PartitionOutcome { partition: name, result }
}

/// Issue `query` against every partition at once. Outcomes come back in
/// partition order regardless of completion order.
pub async fn search_partitions(set: &PartitionSet, query: &PartitionQuery, policy: &CallPolicy) -> Vec<PartitionOutcome> {
    join_all(set.iter().map(|p| search_one(p, query, policy))).await
}

/// Query a single partition (used for the canonical-only autocomplete path).
pub async fn search_partition(p: &Arc<dyn Partition>, query: &PartitionQuery, policy: &CallPolicy) -> PartitionOutcome {
    search_one(p, query, policy).await
}

/// Match count from the canonical partition only. This is an estimate of the
/// distinct-drug total when partitions are not identical replicas.
pub async fn count_canonical(set: &PartitionSet, pattern: &str, policy: &CallPolicy) -> Result<u64, PartitionFailure> {
    let p = set.canonical();
    let res = call_with_policy(p.name(), policy, || p.count(pattern)).await;
    if let Err(e) = &res {
        warn!(partition = %p.name(), error = %e, "canonical count failed");
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32) -> CallPolicy {
        CallPolicy { timeout: Duration::from_millis(50), retries, backoff: Duration::from_millis(1) }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_up_to_the_bound() {
        let calls = AtomicU32::new(0);
        let res: Result<u32, _> = call_with_policy("p", &policy(2), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Unavailable { partition: "p".into(), reason: "flaky".into() })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(res, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<u32, _> = call_with_policy("p", &policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Closed("p".into())) }
        })
        .await;
        assert!(matches!(res, Err(PartitionFailure::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let res: Result<u32, _> = call_with_policy("p", &policy(0), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(res, Err(PartitionFailure::TimedOut(Duration::from_millis(50))));
    }
}
