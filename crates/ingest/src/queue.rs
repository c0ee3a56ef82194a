//! Bounded ingest queue with a fixed worker pool.
//!
//! Webhook handlers acknowledge the provider first and hand the payload
//! here. When the queue is full the payload is dropped with a warning
//! rather than slowing the HTTP response; providers retry on their own
//! schedule.

use std::sync::Arc;

use {
    tokio::sync::{mpsc, Mutex},
    tracing::{debug, warn},
};

use courier_common::ChannelKind;

use crate::pipeline::IngestPipeline;

/// A payload waiting for a worker.
#[derive(Debug)]
pub enum IngestJob {
    /// Delivered to a per-inbox webhook URL.
    Inbound {
        inbox_id: String,
        raw: serde_json::Value,
    },
    /// Delivered to an account-level webhook; the pipeline resolves the
    /// inbox from the payload's routing key.
    Generic {
        kind: ChannelKind,
        raw: serde_json::Value,
    },
}

#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    /// Spawn `workers` tasks draining a queue of `capacity` jobs.
    pub fn start(pipeline: Arc<IngestPipeline>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                loop {
                    // Hold the lock only for the recv so workers interleave.
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let result = match &job {
                        IngestJob::Inbound { inbox_id, raw } => {
                            pipeline.handle_inbound(inbox_id, raw).await
                        },
                        IngestJob::Generic { kind, raw } => {
                            pipeline.handle_generic(*kind, raw).await
                        },
                    };
                    if let Err(error) = result {
                        warn!(worker, %error, "ingest job failed");
                    }
                }
                debug!(worker, "ingest worker stopped");
            });
        }

        Self { tx }
    }

    /// Enqueue without blocking. Returns false when the payload was
    /// dropped because the queue is full or the workers are gone.
    pub fn enqueue(&self, job: IngestJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("ingest queue full, dropping payload");
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("ingest workers gone, dropping payload");
                false
            },
        }
    }
}
