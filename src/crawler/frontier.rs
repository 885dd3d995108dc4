//! Frontier and visited-set bookkeeping
//!
//! The FIFO queue, the visited set, the depth histogram, and the
//! active-worker counter all live under one mutex. [`Frontier::try_admit`]
//! is the single place a URL can enter the crawl: a URL is enqueued only if
//! it is in scope, unseen, and within the depth bound, and it is marked
//! visited in the same critical section so two workers can never admit the
//! same URL twice.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ::url::Url;

use super::types::DepthStats;
use crate::url::{canonicalize, ScopeDecision, ScopePolicy};

/// One unit of crawl work, consumed exactly once by a worker
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    pub parent: Option<String>,
    pub matched_prefix: Option<String>,
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
    OutOfScope,
    TooDeep,
}

/// Outcome of a pop attempt
#[derive(Debug)]
pub enum Pop {
    /// Work to do; the active counter has been incremented
    Entry(FrontierEntry),
    /// Queue is empty but peers are still processing; children may arrive
    Busy,
    /// Queue empty and no worker active: the job is done
    Drained,
}

struct FrontierInner {
    queue: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    /// URLs grouped by depth, recorded when popped
    by_depth: BTreeMap<u32, Vec<String>>,
    /// Workers between pop and the end of their child admissions
    active: usize,
    out_of_scope: u64,
    /// Seeds not yet popped; drives the discovery-phase timer
    seeds_pending: usize,
    started: Option<Instant>,
    discovery_elapsed: Option<Duration>,
}

/// Job-local frontier; shared by workers behind an `Arc`
pub struct Frontier {
    scope: Arc<ScopePolicy>,
    max_depth: u32,
    inner: Mutex<FrontierInner>,
}

impl Frontier {
    pub fn new(scope: Arc<ScopePolicy>, max_depth: u32) -> Self {
        Self {
            scope,
            max_depth,
            inner: Mutex::new(FrontierInner {
                queue: VecDeque::new(),
                visited: HashSet::new(),
                by_depth: BTreeMap::new(),
                active: 0,
                out_of_scope: 0,
                seeds_pending: 0,
                started: None,
                discovery_elapsed: None,
            }),
        }
    }

    pub fn scope(&self) -> &ScopePolicy {
        &self.scope
    }

    /// Starts the discovery-phase clock; called once when the job begins
    pub fn mark_started(&self) {
        let mut inner = self.lock();
        inner.started = Some(Instant::now());
    }

    /// Atomic admission check and enqueue for a raw (possibly relative) URL
    pub fn try_admit(
        &self,
        raw: &str,
        base: Option<&Url>,
        depth: u32,
        parent: Option<&str>,
    ) -> Admission {
        match canonicalize(raw, base) {
            Ok(url) => self.try_admit_url(&url, depth, parent),
            Err(_) => {
                let mut inner = self.lock();
                inner.out_of_scope += 1;
                Admission::OutOfScope
            }
        }
    }

    /// Atomic admission check and enqueue for an already-canonical URL
    pub fn try_admit_url(&self, url: &Url, depth: u32, parent: Option<&str>) -> Admission {
        let decision = self.scope.check(url);
        let mut inner = self.lock();

        let matched_prefix = match decision {
            ScopeDecision::Allowed(prefix) => prefix,
            _ => {
                inner.out_of_scope += 1;
                return Admission::OutOfScope;
            }
        };

        let canonical = url.to_string();
        if inner.visited.contains(&canonical) {
            return Admission::Duplicate;
        }
        if depth > self.max_depth {
            return Admission::TooDeep;
        }

        inner.visited.insert(canonical.clone());
        if depth == 0 {
            inner.seeds_pending += 1;
        }
        inner.queue.push_back(FrontierEntry {
            url: url.clone(),
            depth,
            parent: parent.map(|p| p.to_string()),
            matched_prefix,
        });

        Admission::Admitted
    }

    /// Takes the next entry, or reports why none is available
    ///
    /// On `Entry`, the active counter is incremented and must be released
    /// with [`complete`](Self::complete) after child admissions finish.
    pub fn pop(&self) -> Pop {
        let mut inner = self.lock();
        match inner.queue.pop_front() {
            Some(entry) => {
                inner.active += 1;
                inner
                    .by_depth
                    .entry(entry.depth)
                    .or_default()
                    .push(entry.url.to_string());

                if entry.depth == 0 && inner.seeds_pending > 0 {
                    inner.seeds_pending -= 1;
                    if inner.seeds_pending == 0 {
                        if let Some(started) = inner.started {
                            inner.discovery_elapsed = Some(started.elapsed());
                        }
                    }
                }

                Pop::Entry(entry)
            }
            None if inner.active == 0 => Pop::Drained,
            None => Pop::Busy,
        }
    }

    /// Releases the active slot taken by a pop; returns true when the job
    /// has drained (queue empty and no peer active)
    pub fn complete(&self) -> bool {
        let mut inner = self.lock();
        debug_assert!(inner.active > 0, "complete() without a matching pop()");
        inner.active = inner.active.saturating_sub(1);
        inner.queue.is_empty() && inner.active == 0
    }

    /// Discards all queued work; used on cancellation
    pub fn discard_queue(&self) {
        let mut inner = self.lock();
        inner.queue.clear();
    }

    pub fn discovered(&self) -> u64 {
        self.lock().visited.len() as u64
    }

    pub fn queued(&self) -> u64 {
        self.lock().queue.len() as u64
    }

    pub fn out_of_scope(&self) -> u64 {
        self.lock().out_of_scope
    }

    /// Per-depth URL lists in depth order
    pub fn depth_stats(&self) -> Vec<DepthStats> {
        let inner = self.lock();
        inner
            .by_depth
            .iter()
            .map(|(depth, urls)| DepthStats {
                depth: *depth,
                urls_count: urls.len(),
                urls: urls.clone(),
            })
            .collect()
    }

    /// Wall time from start until every seed left the frontier
    pub fn discovery_elapsed_ms(&self) -> Option<f64> {
        self.lock()
            .discovery_elapsed
            .map(|d| d.as_secs_f64() * 1000.0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierInner> {
        self.inner.lock().expect("frontier lock poisoned")
    }
}
