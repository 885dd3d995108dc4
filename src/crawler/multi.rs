//! Multi-scope scheduling
//!
//! Runs up to `parallel_scopes` scoped jobs concurrently. All scopes share
//! one HTTP client, one per-host rate limiter, and one global worker-permit
//! pool; frontier and robots state stay scope-local. Overlapping path
//! prefixes are reported as warnings but do not prevent the crawl: visited
//! sets are scope-local, and the shared limiter serializes any double
//! fetches against the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::events::{JobEvent, MultiJobEvent, ProgressBus, SUBSCRIBER_BUFFER};
use super::job::{Job, ScopeTag};
use super::types::{JobState, MultiCrawlResult, MultiJobSnapshot};
use crate::config::{
    clamp_depth, clamp_parallel_scopes, clamp_workers, validate_multi_spec, Limits, MultiJobSpec,
};
use crate::fetch::Fetcher;
use crate::limiter::HostLimiter;
use crate::url::{canonicalize, entry_prefix, ScopePolicy};
use crate::Result;

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// Per-scope configuration echo returned at submission
#[derive(Debug, Clone)]
pub struct ScopeStartInfo {
    pub scope_id: String,
    pub scope_name: String,
    pub prefixes: Vec<String>,
}

struct MultiInner {
    id: String,
    domain: String,
    mode: crate::config::CrawlMode,
    parallel_scopes: usize,
    scopes: Vec<Arc<Job>>,
    warnings: Vec<String>,
    bus: ProgressBus<MultiJobEvent>,
    state: Mutex<JobState>,
    cancelled: AtomicBool,
}

/// A multi-scope crawl: N scoped jobs under one worker budget
pub struct MultiScopeJob {
    inner: Arc<MultiInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    scope_infos: Vec<ScopeStartInfo>,
}

impl MultiScopeJob {
    /// Validates the spec and constructs one scoped job per active scope
    pub fn new(spec: MultiJobSpec, limits: Arc<Limits>) -> Result<Self> {
        validate_multi_spec(&spec)?;

        let client = Fetcher::build_client(&limits)?;
        let limiter = Arc::new(HostLimiter::new(limits.default_delay, limits.max_delay));
        let worker_count = clamp_workers(spec.worker_count);
        let permits = Arc::new(Semaphore::new(worker_count));
        let max_depth = clamp_depth(spec.max_depth);
        let parallel_scopes = clamp_parallel_scopes(spec.parallel_scopes);
        let base_domain = spec.domain.trim().to_lowercase();

        let mut scopes: Vec<Arc<Job>> = Vec::new();
        let mut scope_infos: Vec<ScopeStartInfo> = Vec::new();
        let mut prefix_sets: Vec<(String, Vec<String>)> = Vec::new();

        for scope_spec in spec.scopes.iter().filter(|s| s.active) {
            let prefixes = derive_prefixes(&scope_spec.entry_urls);
            let policy = Arc::new(ScopePolicy::with_prefixes(
                &base_domain,
                spec.allow_subdomains,
                &[],
                prefixes.clone(),
            ));
            let scope_depth = clamp_depth(scope_spec.max_depth.unwrap_or(max_depth));

            let job = Job::new_shared(
                scope_spec.entry_urls.clone(),
                spec.mode,
                scope_depth,
                worker_count,
                spec.include_child_pages,
                spec.auto_discover_prefixes,
                policy,
                client.clone(),
                limiter.clone(),
                permits.clone(),
                limits.clone(),
                Some(ScopeTag {
                    id: scope_spec.id.clone(),
                    name: scope_spec.name.clone(),
                }),
            )?;

            scope_infos.push(ScopeStartInfo {
                scope_id: scope_spec.id.clone(),
                scope_name: scope_spec.name.clone(),
                prefixes: prefixes.clone(),
            });
            prefix_sets.push((scope_spec.name.clone(), prefixes));
            scopes.push(Arc::new(job));
        }

        let warnings = detect_overlaps(&prefix_sets);
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        let inner = Arc::new(MultiInner {
            id: super::job::generate_job_id(),
            domain: base_domain,
            mode: spec.mode,
            parallel_scopes,
            scopes,
            warnings,
            bus: ProgressBus::new(SUBSCRIBER_BUFFER),
            state: Mutex::new(JobState::Pending),
            cancelled: AtomicBool::new(false),
        });

        Ok(Self {
            inner,
            handle: Mutex::new(None),
            scope_infos,
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock().expect("state lock poisoned")
    }

    /// Per-scope prefix echo for the submission response
    pub fn scope_infos(&self) -> &[ScopeStartInfo] {
        &self.scope_infos
    }

    /// `overlapping_scopes` warnings detected at submission
    pub fn warnings(&self) -> &[String] {
        &self.inner.warnings
    }

    /// Starts all scope jobs under the parallelism bound; no-op when
    /// already started
    pub fn start(&self) {
        let mut handle = self.handle.lock().expect("handle lock poisoned");
        if handle.is_some() {
            return;
        }
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(run(inner)));
    }

    /// Waits for every scope job to reach a terminal state
    pub async fn wait(&self) {
        let handle = {
            let mut slot = self.handle.lock().expect("handle lock poisoned");
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Cancels every scope job
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
        for job in &self.inner.scopes {
            job.cancel();
        }
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<MultiJobEvent> {
        let snapshot = self.snapshot();
        self.inner
            .bus
            .subscribe(MultiJobEvent::InitialStatus { data: snapshot })
    }

    pub fn snapshot(&self) -> MultiJobSnapshot {
        snapshot_of(&self.inner)
    }

    /// Aggregate results; `None` until terminal
    pub fn result(&self) -> Option<MultiCrawlResult> {
        let state = self.state();
        if !state.is_terminal() {
            return None;
        }

        let scopes: Vec<_> = self
            .inner
            .scopes
            .iter()
            .filter_map(|job| job.result())
            .collect();

        let total_urls_discovered = scopes.iter().map(|r| r.total_urls_discovered).sum();
        let total_urls_processed = scopes.iter().map(|r| r.pages.len() as u64).sum();
        let total_pages_scraped = scopes.iter().map(|r| r.total_pages_scraped).sum();

        Some(MultiCrawlResult {
            job_id: self.inner.id.clone(),
            domain: self.inner.domain.clone(),
            state,
            mode: self.inner.mode,
            scopes,
            total_urls_discovered,
            total_urls_processed,
            total_pages_scraped,
            warnings: self.inner.warnings.clone(),
        })
    }
}

/// Scope prefixes from entry URLs: each entry's path, trailing slash
/// stripped, deduped preserving order
fn derive_prefixes(entry_urls: &[String]) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();
    for raw in entry_urls {
        let Ok(url) = canonicalize(raw, None) else {
            continue;
        };
        let prefix = entry_prefix(&url);
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    prefixes
}

/// Flags identical and nested prefixes across scope pairs
fn detect_overlaps(prefix_sets: &[(String, Vec<String>)]) -> Vec<String> {
    let mut warnings = Vec::new();

    for (i, (name_a, prefixes_a)) in prefix_sets.iter().enumerate() {
        for (name_b, prefixes_b) in prefix_sets.iter().skip(i + 1) {
            for pa in prefixes_a {
                for pb in prefixes_b {
                    if pa == pb {
                        warnings.push(format!(
                            "overlapping_scopes: '{}' and '{}' share prefix {}",
                            name_a, name_b, pa
                        ));
                    } else if pa.starts_with(&format!("{}/", pb)) || pb == "/" {
                        warnings.push(format!(
                            "overlapping_scopes: '{}' prefix {} is nested under '{}' prefix {}",
                            name_a, pa, name_b, pb
                        ));
                    } else if pb.starts_with(&format!("{}/", pa)) || pa == "/" {
                        warnings.push(format!(
                            "overlapping_scopes: '{}' prefix {} is nested under '{}' prefix {}",
                            name_b, pb, name_a, pa
                        ));
                    }
                }
            }
        }
    }

    warnings
}

async fn run(inner: Arc<MultiInner>) {
    *inner.state.lock().expect("state lock poisoned") = JobState::Running;
    tracing::info!(
        "Multi-scope job {} running: {} scopes, {} parallel",
        inner.id,
        inner.scopes.len(),
        inner.parallel_scopes
    );

    // Forward scope events into the aggregate bus before anything starts.
    let mut forwarders = Vec::new();
    for job in &inner.scopes {
        let rx = job.subscribe();
        forwarders.push(tokio::spawn(forward_events(rx, inner.clone())));
    }

    let ticker = tokio::spawn(status_ticker(inner.clone()));

    let gate = Arc::new(Semaphore::new(inner.parallel_scopes));
    let mut runs = Vec::new();
    for job in &inner.scopes {
        let job = job.clone();
        let gate = gate.clone();
        runs.push(tokio::spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return;
            };
            job.start();
            job.wait().await;
        }));
    }
    for run in runs {
        let _ = run.await;
    }

    ticker.abort();
    for forwarder in forwarders {
        let _ = forwarder.await;
    }

    let final_state = aggregate_state(&inner);
    *inner.state.lock().expect("state lock poisoned") = final_state;

    let snapshot = snapshot_of(&inner);
    tracing::info!(
        "Multi-scope job {} {}: {} URLs processed across {} scopes",
        inner.id,
        final_state.as_str(),
        snapshot.total_urls_processed,
        snapshot.total_scopes
    );

    let event = match final_state {
        JobState::Failed => MultiJobEvent::JobFailed {
            data: snapshot,
            error: "one or more scopes failed".to_string(),
        },
        JobState::Cancelled => MultiJobEvent::JobCancelled { data: snapshot },
        _ => MultiJobEvent::JobCompleted { data: snapshot },
    };
    inner
        .bus
        .publish_critical(event, MultiJobEvent::SubscriberOverflow);
}

/// Terminal state rollup: failed if any scope failed, completed iff all
/// completed, cancelled otherwise
fn aggregate_state(inner: &Arc<MultiInner>) -> JobState {
    let states: Vec<JobState> = inner.scopes.iter().map(|job| job.state()).collect();
    if states.iter().any(|s| *s == JobState::Failed) {
        JobState::Failed
    } else if states.iter().all(|s| *s == JobState::Completed) {
        JobState::Completed
    } else {
        JobState::Cancelled
    }
}

async fn forward_events(
    mut rx: tokio::sync::mpsc::Receiver<JobEvent>,
    inner: Arc<MultiInner>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::PageComplete { data } => {
                inner.bus.publish_critical(
                    MultiJobEvent::PageComplete { data },
                    MultiJobEvent::SubscriberOverflow,
                );
            }
            JobEvent::JobCompleted { data }
            | JobEvent::JobCancelled { data }
            | JobEvent::JobFailed { data, .. } => {
                inner.bus.publish_critical(
                    MultiJobEvent::ScopeCompleted { data },
                    MultiJobEvent::SubscriberOverflow,
                );
                // A scope publishes exactly one terminal event; the sender
                // side stays alive with the job, so exit here.
                return;
            }
            // Scope-level status is coalesced into the aggregate ticker.
            JobEvent::InitialStatus { .. }
            | JobEvent::StatusUpdate { .. }
            | JobEvent::SubscriberOverflow => {}
        }
    }
}

async fn status_ticker(inner: Arc<MultiInner>) {
    loop {
        tokio::time::sleep(STATUS_INTERVAL).await;
        if inner.state.lock().expect("state lock poisoned").is_terminal() {
            break;
        }
        inner.bus.publish_coalescible(MultiJobEvent::StatusUpdate {
            data: snapshot_of(&inner),
        });
    }
}

fn snapshot_of(inner: &Arc<MultiInner>) -> MultiJobSnapshot {
    let scopes: Vec<_> = inner.scopes.iter().map(|job| job.snapshot()).collect();
    let count = |state: JobState| scopes.iter().filter(|s| s.state == state).count();

    MultiJobSnapshot {
        job_id: inner.id.clone(),
        domain: inner.domain.clone(),
        state: *inner.state.lock().expect("state lock poisoned"),
        mode: inner.mode,
        total_scopes: scopes.len(),
        scopes_pending: count(JobState::Pending),
        scopes_running: count(JobState::Running),
        scopes_completed: count(JobState::Completed),
        scopes_failed: count(JobState::Failed),
        scopes_cancelled: count(JobState::Cancelled),
        total_urls_discovered: scopes.iter().map(|s| s.urls_discovered).sum(),
        total_urls_processed: scopes.iter().map(|s| s.urls_processed).sum(),
        total_urls_out_of_scope: scopes.iter().map(|s| s.urls_skipped_out_of_scope).sum(),
        scopes,
        warnings: inner.warnings.clone(),
    }
}
