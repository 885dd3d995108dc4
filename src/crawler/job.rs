//! Job lifecycle and aggregation
//!
//! A [`Job`] binds a seed set, a scope policy, a mode, and a budget to one
//! instance of the crawl machinery. States move pending -> running ->
//! (completed | failed | cancelled); seeds are admitted exactly once when
//! the job starts.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use ::url::Url;

use super::events::{JobEvent, ProgressBus, SUBSCRIBER_BUFFER};
use super::frontier::Frontier;
use super::types::{
    CrawlResult, JobSnapshot, JobState, PageResult, TimingMetrics,
};
use super::worker::worker_loop;
use crate::config::{clamp_depth, clamp_workers, CrawlMode, JobSpec, Limits};
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::limiter::HostLimiter;
use crate::robots::RobotsCache;
use crate::url::{canonicalize, ScopePolicy};
use crate::{Result, SeineError};

/// Product token used for robots.txt matching
pub const BOT_USER_AGENT: &str = "SeineBot/1.0";

/// Interval between coalesced status events
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Scope identity carried by jobs belonging to a multi-scope crawl
#[derive(Debug, Clone)]
pub struct ScopeTag {
    pub id: String,
    pub name: String,
}

/// Buffered seed anchors awaiting the prefix-discovery flush
pub(crate) struct SeedDefer {
    pub remaining: usize,
    pub buffered: Vec<(String, Vec<Url>)>,
}

pub(crate) struct JobInner {
    pub id: String,
    pub mode: CrawlMode,
    pub max_depth: u32,
    pub worker_count: usize,
    pub include_child_pages: bool,
    pub seed_urls: Vec<String>,
    pub canonical_seeds: Vec<Url>,
    pub scope: Arc<ScopePolicy>,
    pub frontier: Frontier,
    pub robots: RobotsCache,
    pub limiter: Arc<HostLimiter>,
    pub fetcher: Fetcher,
    pub extractor: Extractor,
    pub bus: ProgressBus<JobEvent>,
    pub results: Mutex<Vec<PageResult>>,
    pub state: Mutex<JobState>,
    pub error: Mutex<Option<String>>,
    pub cancelled: AtomicBool,
    pub permits: Arc<Semaphore>,
    pub work_available: Notify,
    pub current_depth: AtomicU32,
    pub pages_scraped: AtomicU64,
    pub pages_crawled: AtomicU64,
    pub pages_failed: AtomicU64,
    pub crawling_ms: Mutex<f64>,
    pub scraping_ms: Mutex<f64>,
    pub started_at: Mutex<Option<DateTime<Utc>>>,
    pub completed_at: Mutex<Option<DateTime<Utc>>>,
    pub started_instant: Mutex<Option<Instant>>,
    pub total_ms: Mutex<f64>,
    pub seed_defer: Mutex<Option<SeedDefer>>,
    pub scope_tag: Option<ScopeTag>,
    /// Whether prefix auto-discovery defers the seed pass
    pub auto_discover: bool,
}

/// One crawl job, shareable across tasks
pub struct Job {
    inner: Arc<JobInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Generates a short job identifier
pub fn generate_job_id() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

impl Job {
    /// Builds a standalone job with its own HTTP client and rate limiter
    ///
    /// # Errors
    ///
    /// Fails validation when no seed URL canonicalizes, and propagates HTTP
    /// client construction errors.
    pub fn new(spec: JobSpec, limits: Arc<Limits>) -> Result<Self> {
        let canonical_seeds = canonical_seed_set(&spec.seed_urls)?;
        let primary_host = canonical_seeds[0]
            .host_str()
            .ok_or_else(|| SeineError::Validation("seed URL has no host".to_string()))?
            .to_string();

        let scope = Arc::new(ScopePolicy::new(
            &primary_host,
            spec.allow_subdomains,
            &spec.allowed_domains,
        ));

        let client = Fetcher::build_client(&limits)?;
        let limiter = Arc::new(HostLimiter::new(limits.default_delay, limits.max_delay));
        let worker_count = clamp_workers(spec.worker_count);
        let permits = Arc::new(Semaphore::new(worker_count));

        Self::assemble(
            generate_job_id(),
            spec.seed_urls.clone(),
            canonical_seeds,
            spec.mode,
            clamp_depth(spec.max_depth),
            worker_count,
            spec.include_child_pages,
            false,
            scope,
            client,
            limiter,
            permits,
            limits,
            None,
        )
    }

    /// Builds a job that shares transport, limiter, and worker permits with
    /// a multi-scope scheduler
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_shared(
        seed_urls: Vec<String>,
        mode: CrawlMode,
        max_depth: u32,
        worker_count: usize,
        include_child_pages: bool,
        auto_discover: bool,
        scope: Arc<ScopePolicy>,
        client: reqwest::Client,
        limiter: Arc<HostLimiter>,
        permits: Arc<Semaphore>,
        limits: Arc<Limits>,
        scope_tag: Option<ScopeTag>,
    ) -> Result<Self> {
        let canonical_seeds = canonical_seed_set(&seed_urls)?;
        Self::assemble(
            generate_job_id(),
            seed_urls,
            canonical_seeds,
            mode,
            max_depth,
            worker_count,
            include_child_pages,
            auto_discover,
            scope,
            client,
            limiter,
            permits,
            limits,
            scope_tag,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        id: String,
        seed_urls: Vec<String>,
        canonical_seeds: Vec<Url>,
        mode: CrawlMode,
        max_depth: u32,
        worker_count: usize,
        include_child_pages: bool,
        auto_discover: bool,
        scope: Arc<ScopePolicy>,
        client: reqwest::Client,
        limiter: Arc<HostLimiter>,
        permits: Arc<Semaphore>,
        limits: Arc<Limits>,
        scope_tag: Option<ScopeTag>,
    ) -> Result<Self> {
        let frontier = Frontier::new(scope.clone(), max_depth);
        let robots = RobotsCache::new(client.clone(), BOT_USER_AGENT, limits.robots_timeout);
        let fetcher = Fetcher::new(client, limits.clone(), limiter.clone());
        let extractor = Extractor::new(limits.clone());

        let inner = Arc::new(JobInner {
            id,
            mode,
            max_depth,
            worker_count,
            include_child_pages,
            seed_urls,
            canonical_seeds,
            scope,
            frontier,
            robots,
            limiter,
            fetcher,
            extractor,
            bus: ProgressBus::new(SUBSCRIBER_BUFFER),
            results: Mutex::new(Vec::new()),
            state: Mutex::new(JobState::Pending),
            error: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            permits,
            work_available: Notify::new(),
            current_depth: AtomicU32::new(0),
            pages_scraped: AtomicU64::new(0),
            pages_crawled: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            crawling_ms: Mutex::new(0.0),
            scraping_ms: Mutex::new(0.0),
            started_at: Mutex::new(None),
            completed_at: Mutex::new(None),
            started_instant: Mutex::new(None),
            total_ms: Mutex::new(0.0),
            seed_defer: Mutex::new(None),
            scope_tag,
            auto_discover,
        });

        Ok(Self {
            inner,
            handle: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock().expect("state lock poisoned")
    }

    /// Starts the job; calling again is a no-op
    pub fn start(&self) {
        let mut handle = self.handle.lock().expect("handle lock poisoned");
        if handle.is_some() {
            return;
        }
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(run(inner)));
    }

    /// Waits for the job's run task to finish
    pub async fn wait(&self) {
        let handle = {
            let mut slot = self.handle.lock().expect("handle lock poisoned");
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Requests cancellation; in-flight pages complete, the queue is dropped
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
        self.inner.work_available.notify_waiters();
    }

    /// Subscribes to the job's event stream, starting with a status snapshot
    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<JobEvent> {
        let snapshot = self.snapshot();
        self.inner.bus.subscribe(JobEvent::InitialStatus { data: snapshot })
    }

    /// Current observable state of the job
    pub fn snapshot(&self) -> JobSnapshot {
        snapshot_of(&self.inner)
    }

    /// Full results; `None` until the job reaches a terminal state
    pub fn result(&self) -> Option<CrawlResult> {
        let state = self.state();
        if !state.is_terminal() {
            return None;
        }

        let snapshot = self.snapshot();
        let pages = self
            .inner
            .results
            .lock()
            .expect("results lock poisoned")
            .clone();
        let total_pages_scraped = self.inner.pages_scraped.load(Ordering::Relaxed);
        let timing = snapshot.timing;
        let (url_discovery_pct, crawling_pct, scraping_pct) =
            crate::output::timing_percentages(&timing);

        Some(CrawlResult {
            job_id: self.inner.id.clone(),
            seed_urls: self.inner.seed_urls.clone(),
            mode: self.inner.mode,
            max_depth: self.inner.max_depth,
            worker_count: self.inner.worker_count,
            state,
            timing,
            urls_by_depth: snapshot.urls_by_depth,
            pages,
            total_urls_discovered: snapshot.urls_discovered,
            total_pages_scraped,
            url_discovery_pct,
            crawling_pct,
            scraping_pct,
            error: snapshot.error,
            scope_id: self.inner.scope_tag.as_ref().map(|t| t.id.clone()),
            scope_name: self.inner.scope_tag.as_ref().map(|t| t.name.clone()),
            allowed_prefixes: self.inner.scope.prefixes(),
        })
    }
}

/// Canonicalizes a seed list, requiring at least one valid URL
fn canonical_seed_set(seed_urls: &[String]) -> Result<Vec<Url>> {
    let mut seeds = Vec::new();
    for raw in seed_urls {
        match canonicalize(raw, None) {
            Ok(url) => seeds.push(url),
            Err(e) => tracing::warn!("Rejecting seed URL {}: {}", raw, e),
        }
    }
    if seeds.is_empty() {
        return Err(SeineError::Validation(
            "no seed URL canonicalizes to a fetchable http(s) URL".to_string(),
        ));
    }
    Ok(seeds)
}

async fn run(inner: Arc<JobInner>) {
    {
        *inner.state.lock().expect("state lock poisoned") = JobState::Running;
        *inner.started_at.lock().expect("timestamp lock poisoned") = Some(Utc::now());
        *inner.started_instant.lock().expect("timestamp lock poisoned") = Some(Instant::now());
    }
    inner.frontier.mark_started();
    tracing::info!(
        "Job {} running: {} seeds, mode={}, depth<={}, workers={}",
        inner.id,
        inner.canonical_seeds.len(),
        inner.mode.as_str(),
        inner.max_depth,
        inner.worker_count
    );

    // Seeds are admitted exactly once, here.
    let mut admitted = 0usize;
    for seed in &inner.canonical_seeds {
        if inner.frontier.try_admit_url(seed, 0, None) == super::frontier::Admission::Admitted {
            admitted += 1;
        }
    }

    if admitted == 0 {
        fail(&inner, "all seed URLs are out of scope");
        return;
    }

    if inner.auto_discover {
        *inner.seed_defer.lock().expect("seed defer lock poisoned") = Some(SeedDefer {
            remaining: admitted,
            buffered: Vec::new(),
        });
    }

    let ticker = tokio::spawn(status_ticker(inner.clone()));

    let mut workers = Vec::with_capacity(inner.worker_count);
    for worker_id in 0..inner.worker_count {
        workers.push(tokio::spawn(worker_loop(inner.clone(), worker_id)));
    }
    for worker in workers {
        let _ = worker.await;
    }

    ticker.abort();
    finalize(&inner);
}

async fn status_ticker(inner: Arc<JobInner>) {
    loop {
        tokio::time::sleep(STATUS_INTERVAL).await;
        if inner.state.lock().expect("state lock poisoned").is_terminal() {
            break;
        }
        inner
            .bus
            .publish_coalescible(JobEvent::StatusUpdate {
                data: snapshot_of(&inner),
            });
    }
}

fn fail(inner: &Arc<JobInner>, reason: &str) {
    tracing::error!("Job {} failed: {}", inner.id, reason);
    mark_finished(inner, JobState::Failed, Some(reason.to_string()));
    let snapshot = snapshot_of(inner);
    inner.bus.publish_critical(
        JobEvent::JobFailed {
            data: snapshot,
            error: reason.to_string(),
        },
        JobEvent::SubscriberOverflow,
    );
}

fn finalize(inner: &Arc<JobInner>) {
    let state = if inner.cancelled.load(Ordering::Relaxed) {
        inner.frontier.discard_queue();
        JobState::Cancelled
    } else {
        JobState::Completed
    };
    mark_finished(inner, state, None);

    let snapshot = snapshot_of(inner);
    tracing::info!(
        "Job {} {}: {} discovered, {} processed in {:.0}ms",
        inner.id,
        state.as_str(),
        snapshot.urls_discovered,
        snapshot.urls_processed,
        snapshot.timing.total_ms
    );

    let event = match state {
        JobState::Cancelled => JobEvent::JobCancelled { data: snapshot },
        _ => JobEvent::JobCompleted { data: snapshot },
    };
    inner.bus.publish_critical(event, JobEvent::SubscriberOverflow);
}

fn mark_finished(inner: &Arc<JobInner>, state: JobState, error: Option<String>) {
    let total_ms = inner
        .started_instant
        .lock()
        .expect("timestamp lock poisoned")
        .map(|started| started.elapsed().as_secs_f64() * 1000.0)
        .unwrap_or(0.0);
    *inner.total_ms.lock().expect("timing lock poisoned") = total_ms;
    *inner.completed_at.lock().expect("timestamp lock poisoned") = Some(Utc::now());
    if let Some(error) = error {
        *inner.error.lock().expect("error lock poisoned") = Some(error);
    }
    *inner.state.lock().expect("state lock poisoned") = state;
}

pub(crate) fn snapshot_of(inner: &Arc<JobInner>) -> JobSnapshot {
    let state = *inner.state.lock().expect("state lock poisoned");
    let total_ms = if state.is_terminal() {
        *inner.total_ms.lock().expect("timing lock poisoned")
    } else {
        inner
            .started_instant
            .lock()
            .expect("timestamp lock poisoned")
            .map(|started| started.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    };

    let urls_processed = inner
        .results
        .lock()
        .expect("results lock poisoned")
        .iter()
        .filter(|r| r.counts_as_processed())
        .count() as u64;

    JobSnapshot {
        job_id: inner.id.clone(),
        state,
        mode: inner.mode,
        max_depth: inner.max_depth,
        worker_count: inner.worker_count,
        current_depth: inner.current_depth.load(Ordering::Relaxed),
        urls_discovered: inner.frontier.discovered(),
        urls_processed,
        urls_queued: inner.frontier.queued(),
        urls_skipped_out_of_scope: inner.frontier.out_of_scope(),
        pages_scraped: inner.pages_scraped.load(Ordering::Relaxed),
        pages_crawled: inner.pages_crawled.load(Ordering::Relaxed),
        pages_failed: inner.pages_failed.load(Ordering::Relaxed),
        urls_by_depth: inner.frontier.depth_stats(),
        timing: TimingMetrics {
            url_discovery_ms: inner.frontier.discovery_elapsed_ms().unwrap_or(0.0),
            crawling_ms: *inner.crawling_ms.lock().expect("timing lock poisoned"),
            scraping_ms: *inner.scraping_ms.lock().expect("timing lock poisoned"),
            total_ms,
        },
        error: inner.error.lock().expect("error lock poisoned").clone(),
        started_at: *inner.started_at.lock().expect("timestamp lock poisoned"),
        completed_at: *inner.completed_at.lock().expect("timestamp lock poisoned"),
        scope_id: inner.scope_tag.as_ref().map(|t| t.id.clone()),
        scope_name: inner.scope_tag.as_ref().map(|t| t.name.clone()),
        allowed_prefixes: inner.scope.prefixes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(seeds: &[&str]) -> JobSpec {
        JobSpec {
            seed_urls: seeds.iter().map(|s| s.to_string()).collect(),
            mode: CrawlMode::CrawlScrape,
            max_depth: 2,
            worker_count: 2,
            allow_subdomains: false,
            allowed_domains: Vec::new(),
            include_child_pages: true,
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(spec(&["https://example.com/"]), Arc::new(Limits::default())).unwrap();
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.id().len(), 8);
    }

    #[test]
    fn test_rejects_jobs_without_valid_seeds() {
        let result = Job::new(spec(&["javascript:void(0)", "not a url"]), Arc::new(Limits::default()));
        assert!(matches!(result, Err(SeineError::Validation(_))));
    }

    #[test]
    fn test_clamps_inputs() {
        let mut raw = spec(&["https://example.com/"]);
        raw.max_depth = 99;
        raw.worker_count = 100;
        let job = Job::new(raw, Arc::new(Limits::default())).unwrap();
        let snapshot = job.snapshot();
        assert_eq!(snapshot.max_depth, 5);
        assert_eq!(snapshot.worker_count, 10);
    }

    #[test]
    fn test_result_none_before_terminal() {
        let job = Job::new(spec(&["https://example.com/"]), Arc::new(Limits::default())).unwrap();
        assert!(job.result().is_none());
    }

    #[test]
    fn test_job_ids_are_hex() {
        for _ in 0..20 {
            let id = generate_job_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
