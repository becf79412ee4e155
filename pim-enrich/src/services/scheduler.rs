//! Batch scheduling for enrichment requests
//!
//! Keeps interactive latency bounded: the first slice of a request runs
//! inline and its outcomes are returned to the caller; the remainder is
//! handed to a background job queue whose progress is observable only
//! through the status endpoint. The queue worker has its own error
//! boundary, so a deferred run's failure is logged and never crashes the
//! process.

use crate::models::EnrichmentStatus;
use crate::services::orchestrator::{EnrichmentError, EnrichmentOrchestrator, ProductOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Ids processed synchronously per request; the rest is deferred
pub const SYNC_SLICE_SIZE: usize = 5;

/// Immediate result of a dispatch
#[derive(Debug)]
pub struct EnrichmentDispatch {
    /// Outcomes of the synchronous slice, 1:1 with its ids
    pub processed: Vec<ProductOutcome>,
    /// Number of ids deferred to the background queue
    pub queued: usize,
}

#[derive(Debug)]
struct EnrichmentJob {
    job_id: Uuid,
    product_ids: Vec<Uuid>,
}

/// Background queue of deferred enrichment runs
///
/// A single worker task consumes jobs in submission order, so deferred
/// runs never compete with each other for provider rate limits.
struct JobQueue {
    tx: mpsc::UnboundedSender<EnrichmentJob>,
}

impl JobQueue {
    fn start(orchestrator: Arc<EnrichmentOrchestrator>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<EnrichmentJob>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                tracing::info!(
                    job_id = %job.job_id,
                    products = job.product_ids.len(),
                    "Deferred enrichment job started"
                );

                match orchestrator.enrich(&job.product_ids).await {
                    Ok(outcomes) => {
                        let failed = outcomes
                            .iter()
                            .filter(|o| o.status == EnrichmentStatus::Failed)
                            .count();
                        tracing::info!(
                            job_id = %job.job_id,
                            products = outcomes.len(),
                            failed,
                            "Deferred enrichment job completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            job_id = %job.job_id,
                            error = %e,
                            "Deferred enrichment job failed"
                        );
                    }
                }
            }

            tracing::debug!("Enrichment job queue worker stopped");
        });

        Self { tx }
    }

    fn submit(&self, product_ids: Vec<Uuid>) -> Uuid {
        let job_id = Uuid::new_v4();
        let count = product_ids.len();

        if self
            .tx
            .send(EnrichmentJob {
                job_id,
                product_ids,
            })
            .is_err()
        {
            // Worker gone; nothing to do but record the loss
            tracing::error!(job_id = %job_id, count, "Job queue worker unavailable, job dropped");
        } else {
            tracing::info!(job_id = %job_id, count, "Queued products for background enrichment");
        }

        job_id
    }
}

/// Splits enrichment requests into a synchronous slice and a deferred
/// background slice
pub struct BatchScheduler {
    orchestrator: Arc<EnrichmentOrchestrator>,
    jobs: JobQueue,
}

impl BatchScheduler {
    pub fn new(orchestrator: Arc<EnrichmentOrchestrator>) -> Self {
        let jobs = JobQueue::start(orchestrator.clone());
        Self {
            orchestrator,
            jobs,
        }
    }

    /// Dispatch a request: run the first `SYNC_SLICE_SIZE` ids inline,
    /// defer the rest
    pub async fn dispatch(
        &self,
        product_ids: Vec<Uuid>,
    ) -> Result<EnrichmentDispatch, EnrichmentError> {
        if product_ids.is_empty() {
            return Err(EnrichmentError::InvalidRequest(
                "No product IDs provided".to_string(),
            ));
        }

        let split = product_ids.len().min(SYNC_SLICE_SIZE);
        let (sync_slice, deferred) = product_ids.split_at(split);

        let processed = self.orchestrator.enrich(sync_slice).await?;

        let queued = deferred.len();
        if queued > 0 {
            self.jobs.submit(deferred.to_vec());
        }

        Ok(EnrichmentDispatch { processed, queued })
    }
}
