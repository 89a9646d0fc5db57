//! Batch hash generation
//!
//! Draws fresh sequence values, encodes them and persists the result as
//! available identifiers. Generation is fire-and-forget: callers submit to
//! a bounded worker pool and failures surface only through the metrics
//! sink and the log.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::errors::{LinkcutError, Result};
use crate::metrics_core::MetricsRecorder;
use crate::storage::{with_retry, HashStore, RetryPolicy};

/// Produces batches of fresh identifiers.
pub struct HashGenerator {
    hash_store: Arc<dyn HashStore>,
    metrics: Arc<dyn MetricsRecorder>,
    batch_size: u64,
    retry: RetryPolicy,
}

impl HashGenerator {
    pub fn new(
        hash_store: Arc<dyn HashStore>,
        metrics: Arc<dyn MetricsRecorder>,
        batch_size: u64,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            hash_store,
            metrics,
            batch_size,
            retry,
        }
    }

    /// Generate and persist one batch; returns the number of new hashes.
    ///
    /// Runs under the retry executor. Contract violations from the encoder
    /// classify as retryable generation errors.
    pub async fn generate_batch(&self) -> Result<u64> {
        self.metrics.inc_hash_generation_total();
        let start = Instant::now();

        let result = with_retry("generate_hash_batch", self.retry, || self.do_generate()).await;

        self.metrics
            .observe_hash_generation_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(count) => {
                if *count > 0 {
                    self.metrics.inc_hash_generation_success(*count);
                    info!("generated and saved {} hashes", count);
                }
            }
            Err(e) => {
                self.metrics.inc_hash_generation_error(e.metric_kind());
                error!("hash generation failed after all attempts: {}", e);
            }
        }

        result
    }

    async fn do_generate(&self) -> Result<u64> {
        let numbers = self.hash_store.next_sequence(self.batch_size).await?;
        if numbers.is_empty() {
            debug!("no sequence values available for hash generation");
            return Ok(0);
        }

        let unsigned: Vec<u64> = numbers.iter().map(|&n| n as u64).collect();
        let hashes = codec::encode_all(&unsigned);

        if hashes.is_empty() {
            return Err(LinkcutError::generation(format!(
                "encoder produced no hashes for input of size {}",
                numbers.len()
            )));
        }
        if hashes.len() != numbers.len() {
            return Err(LinkcutError::generation(format!(
                "hash count mismatch: expected {}, got {}",
                numbers.len(),
                hashes.len()
            )));
        }

        self.hash_store.insert_if_absent(&hashes).await?;
        Ok(hashes.len() as u64)
    }
}

/// Bounded worker pool executing generation batches asynchronously.
///
/// `submit` enqueues a batch; when the queue is full the batch runs on the
/// caller instead of being dropped, which backpressures request paths
/// without losing work.
pub struct GeneratorPool {
    generator: Arc<HashGenerator>,
    tx: mpsc::Sender<()>,
    workers: Vec<JoinHandle<()>>,
}

impl GeneratorPool {
    pub fn new(generator: Arc<HashGenerator>, worker_size: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<()>(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(worker_size);
        for id in 0..worker_size.max(1) {
            let rx = Arc::clone(&rx);
            let generator = Arc::clone(&generator);
            workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(()) => {
                            // 错误已在 generate_batch 内记录
                            let _ = generator.generate_batch().await;
                        }
                        None => {
                            debug!("generator worker {} stopping", id);
                            break;
                        }
                    }
                }
            }));
        }

        debug!(
            "generator pool started: {} workers, queue capacity {}",
            worker_size, queue_capacity
        );

        Self {
            generator,
            tx,
            workers,
        }
    }

    /// Enqueue one generation batch, running it inline on overflow.
    pub async fn submit(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                warn!("generator queue full, running batch on caller");
                let _ = self.generator.generate_batch().await;
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("generator pool is shut down, dropping batch request");
            }
        }
    }

    /// Stop accepting work and wait briefly for workers to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if tokio::time::timeout(std::time::Duration::from_secs(30), worker)
                .await
                .is_err()
            {
                warn!("generator worker did not stop within 30s, abandoning");
            }
        }
        info!("generator pool shut down");
    }
}
