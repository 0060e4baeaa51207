//! Batched persistence path for successful samples (spec.md §4.1
//! "Persistence path (batch writer)", §9 "Batched writes").
//!
//! Successful samples land on an internal queue; a separate task drains it
//! on a fixed interval and performs one bulk insert per drain. The queue
//! carries a soft upper bound (drop-oldest above it, favoring freshness
//! over completeness per §9) and each bulk insert is capped in size to keep
//! individual transactions small. A bulk insert has its own timeout: on
//! timeout or storage error the drained batch is logged as lost, never
//! retried, so the pipeline never stalls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::error;

use crate::storage::SignalRepository;
use crate::types::SignalSample;

pub struct BatchWriterConfig {
    pub flush_interval: Duration,
    pub flush_timeout: Duration,
    pub soft_queue_max: usize,
    pub max_batch_size: usize,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(5),
            soft_queue_max: 10_000,
            max_batch_size: 2_000,
        }
    }
}

pub struct BatchWriter<R: SignalRepository + 'static> {
    repo: Arc<R>,
    queue: Mutex<VecDeque<SignalSample>>,
    config: BatchWriterConfig,
    stopping: AtomicBool,
}

impl<R: SignalRepository + 'static> BatchWriter<R> {
    pub fn new(repo: Arc<R>, config: BatchWriterConfig) -> Arc<Self> {
        Arc::new(Self {
            repo,
            queue: Mutex::new(VecDeque::new()),
            config,
            stopping: AtomicBool::new(false),
        })
    }

    /// Enqueue a sample for the next drain. Drops the oldest queued entry
    /// once the soft bound is exceeded.
    pub async fn enqueue(&self, sample: SignalSample) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.config.soft_queue_max {
            queue.pop_front();
        }
        queue.push_back(sample);
    }

    /// Drain up to `max_batch_size` queued samples and write them in one
    /// bulk insert. Lost (not retried) on timeout or storage error.
    pub async fn flush(&self) {
        let drained: Vec<SignalSample> = {
            let mut queue = self.queue.lock().await;
            let take = queue.len().min(self.config.max_batch_size);
            queue.drain(..take).collect()
        };

        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        match tokio::time::timeout(self.config.flush_timeout, self.repo.insert_signal_history(&drained)).await {
            Ok(Ok(written)) => {
                tracing::debug!(written, "batch flush wrote samples");
            }
            Ok(Err(e)) => {
                error!(error = %e, lost = count, "batch insert failed, samples lost");
            }
            Err(_) => {
                error!(lost = count, "batch insert timed out, samples lost");
            }
        }
    }

    /// Spawn the recurring flush loop. Stops once `request_stop` has been
    /// called and the final synchronous flush has run.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let writer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(writer.config.flush_interval);
            loop {
                ticker.tick().await;
                if writer.stopping.load(Ordering::Acquire) {
                    break;
                }
                writer.flush().await;
            }
        })
    }

    /// Request the flush loop stop, then perform one final synchronous
    /// flush so no in-flight samples are dropped silently.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.flush().await;
    }

    #[cfg(test)]
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::*;
    use crate::types::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn counting_repo() -> (MockSignalRepository, Arc<AtomicUsize>) {
        let inserted = Arc::new(AtomicUsize::new(0));
        let counted = inserted.clone();
        let mut repo = MockSignalRepository::new();
        repo.expect_insert_signal_history().returning(move |records| {
            counted.fetch_add(records.len(), Ordering::SeqCst);
            Ok(records.len() as u64)
        });
        (repo, inserted)
    }

    fn sample() -> SignalSample {
        SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr: Some(10.0),
            nr_rsrp: None,
            nr_rsrq: None,
            nr_rssi: None,
            nr_bands: None,
            nr_gnb_id: None,
            nr_cid: None,
            lte_sinr: None,
            lte_rsrp: None,
            lte_rsrq: None,
            lte_rssi: None,
            lte_bands: None,
            lte_enb_id: None,
            lte_cid: None,
            registration_status: None,
            device_uptime: None,
        }
    }

    #[tokio::test]
    async fn flush_drains_and_writes_queued_samples() {
        let (repo, inserted) = counting_repo();
        let writer = BatchWriter::new(Arc::new(repo), BatchWriterConfig::default());
        writer.enqueue(sample()).await;
        writer.enqueue(sample()).await;
        writer.flush().await;
        assert_eq!(writer.queue_len().await, 0);
        assert_eq!(inserted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn soft_cap_drops_oldest_entry() {
        let (repo, _inserted) = counting_repo();
        let mut config = BatchWriterConfig::default();
        config.soft_queue_max = 2;
        let writer = BatchWriter::new(Arc::new(repo), config);
        writer.enqueue(sample()).await;
        writer.enqueue(sample()).await;
        writer.enqueue(sample()).await;
        assert_eq!(writer.queue_len().await, 2);
    }

    #[tokio::test]
    async fn stop_performs_final_synchronous_flush() {
        let (repo, inserted) = counting_repo();
        let writer = BatchWriter::new(Arc::new(repo), BatchWriterConfig::default());
        writer.enqueue(sample()).await;
        writer.stop().await;
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
    }
}
