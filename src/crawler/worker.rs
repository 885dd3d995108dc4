//! Worker loop: the fetch/extract/enqueue cycle
//!
//! Each worker pulls one frontier entry at a time, runs the robots gate and
//! the per-host rate limiter, fetches, extracts, records the page row, and
//! admits child URLs. The frontier's active counter brackets the whole
//! cycle, so a peer observing an empty queue cannot declare the job drained
//! while children may still be admitted.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ::url::Url;

use super::events::{JobEvent, PageCompleted};
use super::frontier::{Admission, FrontierEntry, Pop};
use super::job::JobInner;
use super::types::{
    FailureInfo, FailurePhase, FailureType, PageCategory, PageResult, PageStatus, PageTiming,
};
use crate::config::CrawlMode;
use crate::url::{classify_host, first_segment_prefix, HostRelation};

/// How long an idle worker waits before re-checking the frontier
const IDLE_RECHECK: Duration = Duration::from_millis(50);

/// Content shorter than this is treated as absent when deciding page status
const MIN_CONTENT_LENGTH: usize = 50;

pub(crate) async fn worker_loop(inner: Arc<JobInner>, worker_id: usize) {
    tracing::debug!("Worker {} started for job {}", worker_id, inner.id);

    loop {
        if inner.cancelled.load(Ordering::Relaxed) {
            inner.frontier.discard_queue();
            inner.work_available.notify_waiters();
            break;
        }

        match inner.frontier.pop() {
            Pop::Drained => {
                inner.work_available.notify_waiters();
                break;
            }
            Pop::Busy => {
                let _ = tokio::time::timeout(IDLE_RECHECK, inner.work_available.notified()).await;
            }
            Pop::Entry(entry) => {
                let permit = inner.permits.clone().acquire_owned().await;
                match permit {
                    Ok(_permit) => {
                        let admitted = process_entry(&inner, &entry).await;
                        let drained = inner.frontier.complete();
                        if drained || admitted > 0 {
                            inner.work_available.notify_waiters();
                        }
                    }
                    Err(_) => {
                        inner.frontier.complete();
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("Worker {} exiting for job {}", worker_id, inner.id);
}

/// Processes one entry end to end; returns the number of children admitted
async fn process_entry(inner: &Arc<JobInner>, entry: &FrontierEntry) -> usize {
    let gate_start = Instant::now();
    let url = &entry.url;
    let host = url.host_str().unwrap_or_default().to_string();

    // Admission enforces the depth bound; a deeper entry here is a bug.
    debug_assert!(entry.depth <= inner.max_depth);

    let verdict = inner.robots.check(url).await;
    if !verdict.allowed {
        let elapsed_ms = to_ms(gate_start.elapsed());
        tracing::debug!("robots.txt blocked {}", url);
        let result = failed_page(
            inner,
            entry,
            FailureInfo {
                phase: FailurePhase::Crawl,
                failure_type: FailureType::RobotsBlocked,
                reason: Some("blocked by robots.txt".to_string()),
                http_status: None,
            },
            elapsed_ms,
        );
        record_result(inner, result);
        return settle_seed(inner, entry, Vec::new()).await;
    }

    if let Some(delay) = verdict.crawl_delay {
        inner.limiter.set_floor(&host, delay);
    }

    inner.limiter.acquire(&host).await;

    let page_start = Instant::now();
    let fetched = match inner.fetcher.fetch(url).await {
        Ok(success) => success,
        Err(failure) => {
            let elapsed_ms = to_ms(failure.elapsed);
            add_ms(&inner.crawling_ms, elapsed_ms);
            let result = failed_page(inner, entry, failure.failure, elapsed_ms);
            record_result(inner, result);
            return settle_seed(inner, entry, Vec::new()).await;
        }
    };

    let crawl_ms = to_ms(fetched.elapsed);
    add_ms(&inner.crawling_ms, crawl_ms);

    // Cancellation between fetch and extract: finish the row with what the
    // fetch produced, skip content work.
    let cancelled_midway = inner.cancelled.load(Ordering::Relaxed);
    let want_content = inner.mode.scrapes() && !cancelled_midway;

    let scrape_start = Instant::now();
    let extracted = inner
        .extractor
        .extract(&fetched.body, &fetched.final_url, want_content);
    let scrape_ms = to_ms(scrape_start.elapsed());
    if want_content {
        add_ms(&inner.scraping_ms, scrape_ms);
    }

    let links_found = extracted.links_found;

    let mut failure = extracted.failure;
    // A thin page in crawl_scrape mode is a crawled page, not a failure;
    // only_scrape exists to extract, so there it stays a scrape failure.
    if inner.mode == CrawlMode::CrawlScrape {
        if let Some(f) = &failure {
            if f.failure_type == FailureType::EmptyContent {
                failure = None;
            }
        }
    }

    let has_content = failure.is_none()
        && extracted
            .content
            .as_ref()
            .map(|c| c.trim().len() >= MIN_CONTENT_LENGTH)
            .unwrap_or(false);

    let status = if failure.is_some() {
        PageStatus::Error
    } else {
        match inner.mode {
            CrawlMode::OnlyCrawl => PageStatus::Crawled,
            CrawlMode::OnlyScrape => PageStatus::Scraped,
            CrawlMode::CrawlScrape => {
                if has_content {
                    PageStatus::Scraped
                } else {
                    PageStatus::Crawled
                }
            }
        }
    };

    let (total_ms, time_before_failure_ms) = if failure.is_some() {
        let before = crawl_ms + scrape_ms;
        (before, before)
    } else {
        (to_ms(page_start.elapsed()), 0.0)
    };

    let relation = classify_host(&host, inner.scope.primary_host());
    let result = PageResult {
        url: url.to_string(),
        parent_url: entry.parent.clone(),
        depth: entry.depth,
        title: extracted.title,
        content: if has_content { extracted.content } else { None },
        headings: extracted.headings,
        links_found,
        status,
        skip_reason: None,
        has_content,
        timing: PageTiming {
            total_ms,
            crawl_ms,
            scrape_ms,
            time_before_failure_ms,
        },
        failure,
        is_same_domain: relation == HostRelation::Same,
        is_subdomain: relation == HostRelation::Subdomain,
        category: if status == PageStatus::Error {
            PageCategory::Error
        } else {
            result_category(relation)
        },
        matched_prefix: entry.matched_prefix.clone(),
    };

    record_result(inner, result);

    if cancelled_midway {
        return 0;
    }

    settle_seed(inner, entry, extracted.anchors).await
}

fn result_category(relation: HostRelation) -> PageCategory {
    match relation {
        HostRelation::External => PageCategory::ExternalDomain,
        _ => PageCategory::SameDomainSuccess,
    }
}

/// Routes a page's anchors into child admission, honoring the seed-pass
/// deferral used by prefix auto-discovery
///
/// With auto-discovery enabled, depth-0 anchors are buffered until every
/// seed page has completed; the last seed's worker then extends and freezes
/// the prefix set and flushes all buffered anchors through admission.
async fn settle_seed(inner: &Arc<JobInner>, entry: &FrontierEntry, anchors: Vec<Url>) -> usize {
    if entry.depth == 0 {
        let flush = {
            let mut defer = inner.seed_defer.lock().expect("seed defer lock poisoned");
            match defer.as_mut() {
                Some(state) => {
                    state.buffered.push((entry.url.to_string(), anchors));
                    state.remaining = state.remaining.saturating_sub(1);
                    if state.remaining == 0 {
                        Some(std::mem::take(&mut state.buffered))
                    } else {
                        None
                    }
                }
                None => return admit_children(inner, entry, &anchors),
            }
        };

        return match flush {
            Some(batches) => flush_seed_anchors(inner, batches),
            None => 0,
        };
    }

    admit_children(inner, entry, &anchors)
}

/// Extends the scope with prefixes seen on >= 2 distinct seed pages, freezes
/// it, and admits every buffered seed anchor through the frozen policy
fn flush_seed_anchors(inner: &Arc<JobInner>, batches: Vec<(String, Vec<Url>)>) -> usize {
    let mut sources: HashMap<String, HashSet<&str>> = HashMap::new();
    for (parent, anchors) in &batches {
        for anchor in anchors {
            if let Some(prefix) = first_segment_prefix(anchor) {
                sources.entry(prefix).or_default().insert(parent.as_str());
            }
        }
    }

    let discovered: Vec<String> = sources
        .into_iter()
        .filter(|(_, parents)| parents.len() >= 2)
        .map(|(prefix, _)| prefix)
        .collect();

    if !discovered.is_empty() {
        let added = inner.scope.extend_prefixes(discovered);
        if !added.is_empty() {
            tracing::info!(
                "Job {}: auto-discovered {} scope prefixes: {:?}",
                inner.id,
                added.len(),
                added
            );
        }
    }
    inner.scope.freeze();

    if !inner.include_child_pages || !inner.mode.follows_links() || inner.max_depth < 1 {
        return 0;
    }

    let mut admitted = 0;
    for (parent, anchors) in &batches {
        for anchor in anchors {
            if inner.frontier.try_admit_url(anchor, 1, Some(parent)) == Admission::Admitted {
                admitted += 1;
            }
        }
    }
    admitted
}

/// Admits a page's anchors at the next depth, if the job follows links
fn admit_children(inner: &Arc<JobInner>, entry: &FrontierEntry, anchors: &[Url]) -> usize {
    if !inner.include_child_pages || !inner.mode.follows_links() {
        return 0;
    }
    let child_depth = entry.depth + 1;
    if child_depth > inner.max_depth {
        return 0;
    }

    let mut admitted = 0;
    for anchor in anchors {
        if inner.frontier.try_admit_url(anchor, child_depth, Some(entry.url.as_str()))
            == Admission::Admitted
        {
            admitted += 1;
        }
    }
    admitted
}

/// Builds the page row for a crawl-phase failure
fn failed_page(
    inner: &Arc<JobInner>,
    entry: &FrontierEntry,
    failure: FailureInfo,
    elapsed_ms: f64,
) -> PageResult {
    let host = entry.url.host_str().unwrap_or_default();
    let relation = classify_host(host, inner.scope.primary_host());

    PageResult {
        url: entry.url.to_string(),
        parent_url: entry.parent.clone(),
        depth: entry.depth,
        title: None,
        content: None,
        headings: Vec::new(),
        links_found: 0,
        status: PageStatus::Error,
        skip_reason: None,
        has_content: false,
        timing: PageTiming {
            total_ms: elapsed_ms,
            crawl_ms: elapsed_ms,
            scrape_ms: 0.0,
            time_before_failure_ms: elapsed_ms,
        },
        failure: Some(failure),
        is_same_domain: relation == HostRelation::Same,
        is_subdomain: relation == HostRelation::Subdomain,
        category: PageCategory::Error,
        matched_prefix: entry.matched_prefix.clone(),
    }
}

/// Stores a page row, updates counters, and publishes the completion event
fn record_result(inner: &Arc<JobInner>, result: PageResult) {
    match result.status {
        PageStatus::Scraped => inner.pages_scraped.fetch_add(1, Ordering::Relaxed),
        PageStatus::Crawled => inner.pages_crawled.fetch_add(1, Ordering::Relaxed),
        PageStatus::Error => inner.pages_failed.fetch_add(1, Ordering::Relaxed),
        PageStatus::Skipped => 0,
    };
    inner.current_depth.fetch_max(result.depth, Ordering::Relaxed);

    let event = PageCompleted {
        url: result.url.clone(),
        status: result.status,
        depth: result.depth,
        links_found: result.links_found,
        failure: result.failure.clone(),
        matched_prefix: result.matched_prefix.clone(),
    };

    inner
        .results
        .lock()
        .expect("results lock poisoned")
        .push(result);

    inner.bus.publish_critical(
        JobEvent::PageComplete { data: event },
        JobEvent::SubscriberOverflow,
    );
}

fn to_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn add_ms(slot: &std::sync::Mutex<f64>, ms: f64) {
    *slot.lock().expect("timing lock poisoned") += ms;
}
