//! Per-source collection scheduler
//!
//! One task per source, each on its own ticker with a randomized
//! initial offset and per-cycle jitter so sources never stampede in
//! lockstep. A shared semaphore bounds total in-flight collections on
//! top of the per-source limiters. Completed batches flow back over an
//! mpsc channel to the single-threaded pipeline boundary; when the
//! receiver is dropped, every source task winds down on its next send.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use prism_adapters::CollectedBatch;
use prism_core::Signal;

use crate::collector::{Collector, SourceBatch};
use crate::limiter::{LimiterRegistry, RateLimitConfig};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Nominal time between collection cycles per source.
    pub interval: Duration,
    /// Initial start is delayed by a random offset in [0, this].
    pub max_initial_offset: Duration,
    /// Extra random delay in [0, this] added to every cycle.
    pub cycle_jitter: Duration,
    /// Cap on concurrently running collections across all sources.
    pub global_concurrency: usize,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_initial_offset: Duration::from_secs(30),
            cycle_jitter: Duration::from_secs(5),
            global_concurrency: 4,
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            channel_capacity: 64,
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<LimiterRegistry>,
    gate: Arc<Semaphore>,
}

fn random_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=max)
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let gate = Arc::new(Semaphore::new(config.global_concurrency.max(1)));
        Self {
            config,
            registry: Arc::new(LimiterRegistry::new()),
            gate,
        }
    }

    /// Spawn one collection loop per source. Returns the batch
    /// receiver and the task handles; dropping the receiver stops the
    /// loops.
    pub fn spawn(
        &self,
        collectors: Vec<Arc<dyn Collector>>,
        targets: Arc<Vec<Signal>>,
    ) -> (mpsc::Receiver<SourceBatch>, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let mut handles = Vec::with_capacity(collectors.len());
        for collector in collectors {
            let tx = tx.clone();
            let targets = Arc::clone(&targets);
            let config = self.config.clone();
            let limiter = self
                .registry
                .for_source(collector.source_id(), &config.rate_limit);
            let gate = Arc::clone(&self.gate);
            handles.push(tokio::spawn(async move {
                source_loop(collector, targets, config, limiter, gate, tx).await;
            }));
        }
        info!(sources = handles.len(), "collection scheduler started");
        (rx, handles)
    }

    /// Run a single collection cycle across every source, in order,
    /// honoring per-source limiters and the retry policy. A source
    /// that fails even after retries contributes nothing to the
    /// merged batch.
    pub async fn collect_once(
        &self,
        collectors: &[Arc<dyn Collector>],
        targets: &[Signal],
    ) -> CollectedBatch {
        let mut merged = CollectedBatch::default();
        for collector in collectors {
            let limiter = self
                .registry
                .for_source(collector.source_id(), &self.config.rate_limit);
            let _permit = limiter.acquire().await;
            match self.config.retry.run(|_| collector.collect(targets)).await {
                Ok(batch) => {
                    debug!(
                        source = collector.source_id(),
                        alerts = batch.alerts.len(),
                        indicators = batch.indicators.len(),
                        "collection cycle complete"
                    );
                    merged.merge(batch);
                }
                Err(err) => {
                    warn!(source = collector.source_id(), error = %err, "source skipped");
                }
            }
        }
        merged
    }
}

async fn source_loop(
    collector: Arc<dyn Collector>,
    targets: Arc<Vec<Signal>>,
    config: SchedulerConfig,
    limiter: Arc<crate::limiter::RateLimiter>,
    gate: Arc<Semaphore>,
    tx: mpsc::Sender<SourceBatch>,
) {
    let source_id = collector.source_id().to_string();
    tokio::time::sleep(random_delay(config.max_initial_offset)).await;

    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tokio::time::sleep(random_delay(config.cycle_jitter)).await;

        let Ok(_gate) = gate.acquire().await else {
            return;
        };
        let _permit = limiter.acquire().await;

        let result = config
            .retry
            .run(|_| collector.collect(&targets))
            .await;
        match result {
            Ok(batch) if batch.is_empty() => {
                debug!(source = %source_id, "empty collection cycle");
            }
            Ok(batch) => {
                let delivered = tx
                    .send(SourceBatch {
                        source_id: source_id.clone(),
                        batch,
                    })
                    .await;
                if delivered.is_err() {
                    debug!(source = %source_id, "batch receiver closed, stopping");
                    return;
                }
            }
            Err(err) => {
                // Skipped for this cycle; the next tick tries again.
                warn!(source = %source_id, error = %err, "collection cycle failed");
            }
        }
        if tx.is_closed() {
            return;
        }
    }
}
