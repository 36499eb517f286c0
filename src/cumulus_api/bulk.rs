//! Concurrent fan-out of single-record operations

use crate::cumulus_api::client::CumulusClient;
use crate::cumulus_api::types::CumulusError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Default number of requests in flight during a fan-out
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Outcome of one record in a fan-out
#[derive(Debug)]
pub struct BulkOutcome<T, R> {
    pub record: T,
    pub result: Result<R, CumulusError>,
}

impl<T, R> BulkOutcome<T, R> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Apply `operation` to every record with at most `concurrency` running at once
///
/// Every record yields exactly one [`BulkOutcome`]; a failing record never
/// stops the others. Outcomes arrive in completion order. Dropping the
/// returned future does not cancel tasks already spawned.
pub async fn apply_concurrently<T, R, F, Fut>(
    operation: F,
    records: Vec<T>,
    concurrency: usize,
) -> Vec<BulkOutcome<T, R>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CumulusError>> + Send + 'static,
{
    let total = records.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let operation = Arc::new(operation);

    let mut pending = FuturesUnordered::new();
    for record in records {
        let semaphore = Arc::clone(&semaphore);
        let operation = Arc::clone(&operation);
        let task_record = record.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| CumulusError::Task(format!("worker pool closed: {}", e)))?;
            operation(task_record).await
        });

        pending.push(async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Bulk worker task failed: {}", e);
                    Err(CumulusError::Task(e.to_string()))
                }
            };
            BulkOutcome { record, result }
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = pending.next().await {
        if let Err(e) = &outcome.result {
            tracing::warn!("Bulk operation failed for one record: {}", e);
        }
        outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    tracing::info!(
        "Bulk operation finished: {} succeeded, {} failed",
        total - failed,
        failed
    );
    outcomes
}

impl CumulusClient {
    /// Fan `operation` out over `records`, handing every worker its own clone
    /// of this client
    pub async fn apply_concurrently<T, R, F, Fut>(
        &self,
        operation: F,
        records: Vec<T>,
    ) -> Vec<BulkOutcome<T, R>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(CumulusClient, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CumulusError>> + Send + 'static,
    {
        let client = self.clone();
        apply_concurrently(
            move |record| operation(client.clone(), record),
            records,
            DEFAULT_CONCURRENCY,
        )
        .await
    }
}
