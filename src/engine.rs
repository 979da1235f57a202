//! Concurrent request dispatch with retries and shared statistics.
//!
//! [`run`] spawns one task per worker. Within a worker, requests are strictly
//! sequential and alternate GET/POST; across workers, everything runs in
//! parallel. The only state touched by more than one worker is the proxy
//! rotation cursor and the shared counters, both updated atomically. A
//! monitor task refreshes a transient progress line until all workers have
//! finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sketches_ddsketch::DDSketch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::identity::IdentityGenerator;
use crate::proxy::ProxyRotator;
use crate::report::Report;
use crate::transport::{Method, SharedTransport, TransportError};

/// Sentinel status reported when a request ran out of attempts without ever
/// seeing a terminal response.
pub const NO_RESPONSE: u16 = 0;

/// Interval between progress line refreshes.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Final classification of one logical request, after all retries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestOutcome {
    /// The request resolved with a 2xx status.
    Success(u16),
    /// The request resolved with a terminal non-2xx status, or with
    /// [`NO_RESPONSE`] once all attempts were exhausted.
    Failed(u16),
}

/// Counters local to one worker, merged into the shared stats once the
/// worker finishes its quota.
#[derive(Default)]
struct WorkerStats {
    attempted: u64,
    succeeded: u64,
    failed: u64,
    latency: DDSketch,
}

impl std::fmt::Debug for WorkerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerStats")
            .field("attempted", &self.attempted)
            .field("succeeded", &self.succeeded)
            .field("failed", &self.failed)
            .field("latency", &format_args!("DDSketch({})", self.latency.count()))
            .finish()
    }
}

impl WorkerStats {
    fn record(&mut self, outcome: RequestOutcome, elapsed: Duration) {
        self.attempted += 1;
        match outcome {
            RequestOutcome::Success(_) => self.succeeded += 1,
            RequestOutcome::Failed(_) => self.failed += 1,
        }
        self.latency.add(elapsed.as_secs_f64());
    }
}

/// Run-wide counters, read by the monitor while workers merge into them.
#[derive(Debug, Default)]
struct SharedStats {
    completed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug)]
struct StatsSnapshot {
    completed: u64,
    succeeded: u64,
    failed: u64,
}

impl SharedStats {
    fn merge(&self, stats: &WorkerStats) {
        self.completed.fetch_add(stats.attempted, Ordering::Relaxed);
        self.succeeded.fetch_add(stats.succeeded, Ordering::Relaxed);
        self.failed.fetch_add(stats.failed, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// One sequential request stream.
struct Worker {
    id: usize,
    quota: usize,
    max_retries: u32,
    backoff: Duration,
    transport: SharedTransport,
    rotator: Arc<ProxyRotator>,
    identity: IdentityGenerator,
}

impl Worker {
    /// Issues the worker's full quota, strictly one request at a time.
    async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        for position in 0..self.quota {
            let method = if position % 2 == 0 {
                Method::Get
            } else {
                Method::Post
            };

            let started = Instant::now();
            let outcome = self.execute(method).await;
            stats.record(outcome, started.elapsed());
        }

        tracing::debug!(
            worker = self.id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "worker finished"
        );
        stats
    }

    /// Runs the bounded retry loop for one logical request.
    async fn execute(&mut self, method: Method) -> RequestOutcome {
        let mut attempt = 1u32;
        loop {
            match self.attempt(method).await {
                // The no-response sentinel and server errors are retryable.
                Ok(status) if status == NO_RESPONSE || status >= 500 => {
                    tracing::debug!(
                        worker = self.id,
                        method = method.as_str(),
                        attempt,
                        status,
                        "retryable status"
                    );
                }
                Ok(status) if (200..300).contains(&status) => {
                    return RequestOutcome::Success(status);
                }
                // Anything else, 4xx included, is terminal and never retried.
                Ok(status) => return RequestOutcome::Failed(status),
                Err(error) => {
                    tracing::debug!(
                        worker = self.id,
                        method = method.as_str(),
                        attempt,
                        error = &error as &dyn std::error::Error,
                        "transport failure"
                    );
                }
            }

            if attempt > self.max_retries {
                return RequestOutcome::Failed(NO_RESPONSE);
            }
            tokio::time::sleep(self.backoff * attempt).await;
            attempt += 1;
        }
    }

    /// One attempt: fresh identity, freshly rotated proxy, one transport call.
    async fn attempt(&mut self, method: Method) -> Result<u16, TransportError> {
        let headers = self.identity.headers();
        let body = (method == Method::Post).then(|| self.identity.body());
        let proxy = self.rotator.next();

        self.transport
            .send(method, &headers, body.as_ref(), proxy.as_ref())
            .await
    }
}

/// Runs the full load test described by `config` over the given transport.
///
/// Spawns all workers and the progress monitor, joins the workers, stops the
/// monitor, and returns the aggregated [`Report`]. The run always completes
/// and always produces a report, even at a 100% failure rate.
pub async fn run(config: &Config, transport: SharedTransport) -> Result<Report> {
    let rotator = Arc::new(ProxyRotator::new(config.proxies.clone()));
    let stats = Arc::new(SharedStats::default());
    let total = config.total_requests();

    let started = Instant::now();

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(100));

    let cancellation = CancellationToken::new();
    let monitor = tokio::spawn(monitor(
        Arc::clone(&stats),
        total,
        started,
        bar,
        cancellation.clone(),
    ));

    let tasks: Vec<_> = (0..config.workers)
        .map(|id| {
            let worker = Worker {
                id,
                quota: config.requests_per_worker,
                max_retries: config.max_retries,
                backoff: config.backoff,
                transport: Arc::clone(&transport),
                rotator: Arc::clone(&rotator),
                identity: IdentityGenerator::new(),
            };
            let stats = Arc::clone(&stats);

            tokio::spawn(async move {
                let local = worker.run().await;
                stats.merge(&local);
                local
            })
        })
        .collect();

    let finished = futures::future::join_all(tasks).await;

    cancellation.cancel();
    monitor.await?;

    let duration = started.elapsed();
    let mut latency = DDSketch::default();
    for task in finished {
        let local = task?;
        latency
            .merge(&local.latency)
            .expect("sketches share default parameters");
    }

    let snapshot = stats.snapshot();
    Ok(Report {
        total,
        succeeded: snapshot.succeeded,
        failed: snapshot.failed,
        duration,
        latency,
    })
}

/// Periodically refreshes the progress line until cancelled.
///
/// Best-effort telemetry: missed ticks are skipped and never hold up the
/// workers.
async fn monitor(
    stats: Arc<SharedStats>,
    total: u64,
    started: Instant,
    bar: ProgressBar,
    cancellation: CancellationToken,
) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = stats.snapshot();
                let elapsed = started.elapsed().as_secs_f64();
                let rps = if elapsed > 0.0 {
                    snapshot.completed as f64 / elapsed
                } else {
                    0.0
                };

                bar.set_message(format!(
                    "Progress: {}/{} | Success: {} | Failure: {} | RPS: {:.2}",
                    snapshot.completed, total, snapshot.succeeded, snapshot.failed, rps,
                ));
            }
        }
    }

    bar.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::transport::{Transport, TransportError};

    /// Always answers with the same status, counting calls.
    #[derive(Debug)]
    struct StaticTransport {
        status: u16,
        calls: AtomicU64,
        methods: Mutex<Vec<Method>>,
    }

    impl StaticTransport {
        fn new(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicU64::new(0),
                methods: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for StaticTransport {
        async fn send(
            &self,
            method: Method,
            _headers: &[(&'static str, String)],
            _body: Option<&serde_json::Value>,
            _proxy: Option<&crate::proxy::ProxyEndpoint>,
        ) -> Result<u16, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.methods.lock().unwrap().push(method);
            Ok(self.status)
        }
    }

    /// Fails every call at the connection level.
    #[derive(Debug)]
    struct UnreachableTransport {
        calls: AtomicU64,
    }

    #[async_trait::async_trait]
    impl Transport for UnreachableTransport {
        async fn send(
            &self,
            _method: Method,
            _headers: &[(&'static str, String)],
            _body: Option<&serde_json::Value>,
            _proxy: Option<&crate::proxy::ProxyEndpoint>,
        ) -> Result<u16, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(TransportError::Timeout)
        }
    }

    fn worker(transport: SharedTransport, max_retries: u32, quota: usize) -> Worker {
        Worker {
            id: 0,
            quota,
            max_retries,
            backoff: Duration::from_millis(1),
            transport,
            rotator: Arc::new(ProxyRotator::new(Vec::new())),
            identity: IdentityGenerator::seeded(7),
        }
    }

    #[tokio::test]
    async fn first_attempt_success_is_not_retried() {
        let transport = StaticTransport::new(200);
        let mut worker = worker(transport.clone(), 3, 0);

        let outcome = worker.execute(Method::Get).await;

        assert_eq!(outcome, RequestOutcome::Success(200));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn client_errors_are_terminal_but_failed() {
        let transport = StaticTransport::new(404);
        let mut worker = worker(transport.clone(), 2, 0);

        let outcome = worker.execute(Method::Get).await;

        assert_eq!(outcome, RequestOutcome::Failed(404));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_exhaustion() {
        let transport = StaticTransport::new(503);
        let mut worker = worker(transport.clone(), 2, 0);

        let outcome = worker.execute(Method::Get).await;

        assert_eq!(outcome, RequestOutcome::Failed(NO_RESPONSE));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_attempt() {
        let transport = StaticTransport::new(500);
        let mut worker = worker(transport.clone(), 0, 0);

        let outcome = worker.execute(Method::Get).await;

        assert_eq!(outcome, RequestOutcome::Failed(NO_RESPONSE));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn transport_faults_are_retried_like_server_errors() {
        let transport = Arc::new(UnreachableTransport {
            calls: AtomicU64::new(0),
        });
        let mut worker = worker(transport.clone(), 3, 0);

        let outcome = worker.execute(Method::Post).await;

        assert_eq!(outcome, RequestOutcome::Failed(NO_RESPONSE));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn workers_alternate_get_and_post() {
        let transport = StaticTransport::new(200);
        let stats = worker(transport.clone(), 0, 4).run().await;

        assert_eq!(stats.attempted, 4);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(
            *transport.methods.lock().unwrap(),
            [Method::Get, Method::Post, Method::Get, Method::Post]
        );
    }

    #[tokio::test]
    async fn worker_stats_split_by_status_class() {
        let transport = StaticTransport::new(404);
        let stats = worker(transport, 1, 3).run().await;

        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.latency.count(), 3);
    }
}
