//! Compute substrate: where jobs run.
//!
//! A job is one complete graph evaluation. The engine itself never spawns;
//! worker replicas and concurrent requests are dispatched through a
//! [`ComputeSubstrate`] so deployments can swap the local task pool for a
//! cluster scheduler without touching the engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::data::Dataset;
use crate::error::RequestError;

/// One dispatchable evaluation producing result datasets.
pub struct Job {
    pub id: String,
    pub work: BoxFuture<'static, Result<Vec<Dataset>, RequestError>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        work: BoxFuture<'static, Result<Vec<Dataset>, RequestError>>,
    ) -> Self {
        Job {
            id: id.into(),
            work,
        }
    }
}

/// Occupancy counters for observability. Snapshot values, not a control
/// surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstrateMetrics {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

#[async_trait]
pub trait ComputeSubstrate: Send + Sync {
    /// Run a batch of jobs to completion and return their outputs in
    /// dispatch order. Any job failure fails the batch.
    async fn dispatch(&self, jobs: Vec<Job>) -> Result<Vec<Vec<Dataset>>, RequestError>;

    fn metrics(&self) -> SubstrateMetrics;
}

/// Tokio-task substrate: every job becomes one spawned task.
#[derive(Default)]
pub struct LocalSubstrate {
    active: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl LocalSubstrate {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComputeSubstrate for LocalSubstrate {
    async fn dispatch(&self, jobs: Vec<Job>) -> Result<Vec<Vec<Dataset>>, RequestError> {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let active = Arc::clone(&self.active);
            let completed = Arc::clone(&self.completed);
            let failed = Arc::clone(&self.failed);
            let job_id = job.id.clone();
            let work = job.work;
            active.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(job = %job_id, "dispatching job");
            handles.push((
                job_id,
                tokio::spawn(async move {
                    let outcome = work.await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    match &outcome {
                        Ok(_) => completed.fetch_add(1, Ordering::SeqCst),
                        Err(_) => failed.fetch_add(1, Ordering::SeqCst),
                    };
                    outcome
                }),
            ));
        }

        let mut outputs = Vec::with_capacity(handles.len());
        for (job_id, handle) in handles {
            let datasets = handle
                .await
                .map_err(|e| RequestError::DispatchError(format!("job '{job_id}': {e}")))??;
            outputs.push(datasets);
        }
        Ok(outputs)
    }

    fn metrics(&self) -> SubstrateMetrics {
        SubstrateMetrics {
            active: self.active.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn job(id: &str, outcome: Result<Vec<Dataset>, RequestError>) -> Job {
        Job::new(id, async move { outcome }.boxed())
    }

    #[tokio::test]
    async fn test_dispatch_preserves_order() {
        let substrate = LocalSubstrate::new();
        let outputs = substrate
            .dispatch(vec![
                job("a", Ok(vec![Dataset::new("first")])),
                job("b", Ok(vec![Dataset::new("second")])),
            ])
            .await
            .unwrap();
        assert_eq!(outputs[0][0].id, "first");
        assert_eq!(outputs[1][0].id, "second");
        assert_eq!(
            substrate.metrics(),
            SubstrateMetrics {
                active: 0,
                completed: 2,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failed_job_fails_the_batch() {
        let substrate = LocalSubstrate::new();
        let err = substrate
            .dispatch(vec![
                job("ok", Ok(vec![])),
                job("bad", Err(RequestError::InternalError("boom".into()))),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::InternalError(_)));
        assert_eq!(substrate.metrics().failed, 1);
    }
}
