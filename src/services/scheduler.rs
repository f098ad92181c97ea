//! Concurrency-limited fetch scheduler.
//!
//! Limits are semaphores: one global, one per destination host. Permits are
//! taken per HTTP attempt inside [`ThrottledTransport`], so a target sleeping
//! through a backoff holds nothing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::models::{Config, SchedulerConfig};
use crate::services::progress::ProgressReporter;
use crate::services::retry::{FetchReport, FetchState, RetryController, RetryPolicy, TargetResult};
use crate::services::transport::{FetchOutcome, Transport};
use crate::utils::host_key;

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Stable id used in failure reports (`cursor:40`, `pass:123:20`, ..)
    pub id: String,
    pub url: String,
}

impl FetchTarget {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Transport decorator enforcing the in-flight limits.
pub struct ThrottledTransport {
    inner: Arc<dyn Transport>,
    global: Arc<Semaphore>,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
    max_per_host: usize,
}

impl ThrottledTransport {
    pub fn new(inner: Arc<dyn Transport>, config: &SchedulerConfig) -> Self {
        Self {
            inner,
            global: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            per_host: Mutex::new(HashMap::new()),
            max_per_host: config.max_per_host.max(1),
        }
    }

    fn host_semaphore(&self, url: &str) -> Option<Arc<Semaphore>> {
        let host = host_key(url)?;
        let mut hosts = self
            .per_host
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(
            hosts
                .entry(host)
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
                .clone(),
        )
    }
}

#[async_trait]
impl Transport for ThrottledTransport {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        // Host first, so waiting on a slow host does not pin a global permit.
        let _host_permit = match self.host_semaphore(url) {
            Some(semaphore) => match semaphore.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return FetchOutcome::TransientError("host limiter closed".into()),
            },
            None => None,
        };
        let _permit = match self.global.acquire().await {
            Ok(permit) => permit,
            Err(_) => return FetchOutcome::TransientError("scheduler closed".into()),
        };
        self.inner.fetch(url).await
    }
}

/// Runs fetch targets in bounded parallel batches.
pub struct FetchScheduler {
    controller: RetryController,
    concurrency: usize,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressReporter>,
}

impl FetchScheduler {
    /// Wrap `transport` with throttling and the retry policy from `config`.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &Config,
        cancel: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        let throttled: Arc<dyn Transport> =
            Arc::new(ThrottledTransport::new(transport, &config.scheduler));
        let controller = RetryController::new(
            throttled,
            RetryPolicy::from_config(&config.retry),
            cancel.clone(),
        );
        Self {
            controller,
            concurrency: config.scheduler.max_in_flight.max(1),
            cancel,
            progress,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch one target; not started at all once cancelled.
    pub async fn fetch(&self, target: &FetchTarget) -> FetchReport {
        if self.is_cancelled() {
            return FetchReport {
                result: TargetResult::Cancelled,
                attempts: 0,
                delays: Vec::new(),
                state: FetchState::Pending,
            };
        }
        self.controller.fetch(&target.id, &target.url).await
    }

    /// Fetch a batch concurrently. Results come back in completion order.
    pub async fn fetch_batch(&self, targets: Vec<FetchTarget>) -> Vec<(FetchTarget, FetchReport)> {
        self.run_concurrent(targets, |target| async move {
            let report = self.fetch(&target).await;
            (target, report)
        })
        .await
    }

    /// Run arbitrary per-item work concurrently under the same bound.
    ///
    /// Used for targets that need several sequential fetches each.
    pub async fn run_concurrent<I, T, F, Fut>(&self, items: Vec<I>, work: F) -> Vec<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        stream::iter(items)
            .map(work)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Report progress, then sleep the inter-batch delay unless cancelled.
    pub async fn end_batch(&self, processed: usize, total: usize, delay: Duration) {
        self.progress.report(processed, total);
        if delay.is_zero() || self.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::services::progress::LatestProgress;
    use crate::services::retry::Fetched;

    /// Counts concurrent calls and remembers the peak.
    struct GaugeTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transport for GaugeTransport {
        async fn fetch(&self, _url: &str) -> FetchOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            FetchOutcome::Success(b"{}".to_vec())
        }
    }

    fn config(max_in_flight: usize, max_per_host: usize) -> Config {
        let mut config = Config::default();
        config.scheduler.max_in_flight = max_in_flight;
        config.scheduler.max_per_host = max_per_host;
        config
    }

    fn targets(host: &str, n: usize) -> Vec<FetchTarget> {
        (0..n)
            .map(|i| FetchTarget::new(format!("t{i}"), format!("http://{host}/p?i={i}")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn per_host_limit_bounds_in_flight() {
        let gauge = Arc::new(GaugeTransport {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let scheduler = FetchScheduler::new(
            gauge.clone(),
            &config(30, 3),
            CancellationToken::new(),
            Arc::new(LatestProgress::new()),
        );

        let results = scheduler.fetch_batch(targets("a.test", 12)).await;

        assert_eq!(results.len(), 12);
        assert!(results
            .iter()
            .all(|(_, r)| r.result == TargetResult::Done(Fetched::Body(b"{}".to_vec()))));
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn global_limit_bounds_across_hosts() {
        let gauge = Arc::new(GaugeTransport {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let scheduler = FetchScheduler::new(
            gauge.clone(),
            &config(4, 4),
            CancellationToken::new(),
            Arc::new(LatestProgress::new()),
        );
        let mut work = targets("a.test", 6);
        work.extend(targets("b.test", 6));

        scheduler.fetch_batch(work).await;
        assert!(gauge.peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scheduler_issues_nothing() {
        let gauge = Arc::new(GaugeTransport {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let progress = Arc::new(LatestProgress::new());
        let scheduler =
            FetchScheduler::new(gauge.clone(), &config(4, 4), cancel.clone(), progress.clone());
        cancel.cancel();

        let results = scheduler.fetch_batch(targets("a.test", 3)).await;
        assert!(results.iter().all(|(_, r)| r.result == TargetResult::Cancelled));
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 0);

        scheduler.end_batch(0, 3, Duration::from_secs(60)).await;
        assert_eq!(progress.latest(), (0, 3));
    }
}
