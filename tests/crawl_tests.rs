//! End-to-end crawl tests
//!
//! These tests run full jobs against wiremock fixtures and check the
//! engine's observable guarantees: deduplication, scope containment, depth
//! bounds, failure classification, retry behavior, and event delivery.

use std::sync::Arc;
use std::time::Duration;

use seine::config::{CrawlMode, JobSpec, Limits};
use seine::crawler::{
    FailurePhase, FailureType, Job, JobEvent, JobState, PageStatus,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Limits tuned so tests run quickly while preserving engine behavior
fn test_limits() -> Arc<Limits> {
    Arc::new(Limits {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        default_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(200),
        robots_timeout: Duration::from_secs(2),
        ..Limits::default()
    })
}

fn job_spec(seed: &str, max_depth: u32) -> JobSpec {
    JobSpec {
        seed_urls: vec![seed.to_string()],
        mode: CrawlMode::CrawlScrape,
        max_depth,
        worker_count: 2,
        allow_subdomains: false,
        allowed_domains: Vec::new(),
        include_child_pages: true,
    }
}

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!(
            "<html><head><title>{}</title></head><body><main><p>This body text is long \
             enough to count as extractable page content for the engine.</p>{}</main></body></html>",
            title, body
        ))
        .insert_header("content-type", "text/html")
}

async fn run_job(spec: JobSpec) -> Job {
    let job = Job::new(spec, test_limits()).expect("failed to build job");
    job.start();
    job.wait().await;
    job
}

#[tokio::test]
async fn test_canonical_duplicates_fetched_once() {
    let server = MockServer::start().await;

    // "/" links to /b twice under different surface forms; both
    // canonicalize to the same URL and must be fetched once.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            r#"<a href="/b">one</a><a href="/b/">two</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("B", ""))
        .expect(1)
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 2)).await;
    assert_eq!(job.state(), JobState::Completed);

    let result = job.result().expect("terminal job has a result");
    assert_eq!(result.pages.len(), 2);
    assert_eq!(result.total_urls_discovered, 2);

    let root = result
        .pages
        .iter()
        .find(|p| p.depth == 0)
        .expect("seed page present");
    assert_eq!(root.links_found, 2);
    assert_eq!(root.status, PageStatus::Scraped);

    // P1: at most one PageResult per canonical URL.
    let mut urls: Vec<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), result.pages.len());
}

#[tokio::test]
async fn test_external_links_not_followed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            r#"<a href="http://other.test/x">external</a>"#,
        ))
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 2)).await;
    let result = job.result().unwrap();
    let snapshot = job.snapshot();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].links_found, 1);
    assert_eq!(snapshot.urls_skipped_out_of_scope, 1);
    assert!(!result.pages.iter().any(|p| p.url.contains("other.test")));
}

#[tokio::test]
async fn test_transient_500_retried_to_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Recovered", ""))
        .expect(1)
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 1)).await;
    let result = job.result().unwrap();

    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(result.pages.len(), 1);

    let page = &result.pages[0];
    assert!(page.failure.is_none());
    assert_eq!(page.status, PageStatus::Scraped);
    // Crawl time spans both attempts.
    assert!(page.timing.crawl_ms > 0.0);
}

#[tokio::test]
async fn test_404_is_a_page_failure_not_a_job_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 1)).await;
    assert_eq!(job.state(), JobState::Completed);

    let result = job.result().unwrap();
    assert_eq!(result.pages.len(), 1);

    let page = &result.pages[0];
    assert_eq!(page.status, PageStatus::Error);
    let failure = page.failure.as_ref().expect("failure recorded");
    assert_eq!(failure.phase, FailurePhase::Crawl);
    assert_eq!(failure.failure_type, FailureType::Http4xx);
    assert_eq!(failure.http_status, Some(404));
    // Timing invariant: on failure, total equals time-before-failure.
    assert_eq!(page.timing.total_ms, page.timing.time_before_failure_ms);
}

#[tokio::test]
async fn test_robots_disallow_blocks_seed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Hidden", r#"<a href="/child">c</a>"#))
        .expect(0)
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 2)).await;
    assert_eq!(job.state(), JobState::Completed);

    let result = job.result().unwrap();
    assert_eq!(result.pages.len(), 1);
    let failure = result.pages[0].failure.as_ref().unwrap();
    assert_eq!(failure.failure_type, FailureType::RobotsBlocked);
    assert_eq!(result.pages[0].category, seine::crawler::PageCategory::Error);
}

#[tokio::test]
async fn test_depth_bound_and_parent_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Root", r#"<a href="/l1">next</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/l1"))
        .respond_with(html_page("L1", r#"<a href="/l2">next</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/l2"))
        .respond_with(html_page("L2", r#"<a href="/l3">next</a>"#))
        .expect(0)
        .mount(&server)
        .await;

    let base = server.uri();
    let job = run_job(job_spec(&format!("{}/", base), 1)).await;
    let result = job.result().unwrap();

    // Depth 0 seed and depth 1 child only; /l2 is beyond max_depth=1.
    assert_eq!(result.pages.len(), 2);
    for page in &result.pages {
        assert!(page.depth <= 1);
        // P3: depth 0 iff seed.
        assert_eq!(page.depth == 0, page.parent_url.is_none());
        // P4: a child's parent is one depth above it.
        if let Some(parent_url) = &page.parent_url {
            let parent = result
                .pages
                .iter()
                .find(|p| &p.url == parent_url)
                .expect("parent page recorded");
            assert_eq!(parent.depth + 1, page.depth);
        }
    }
}

#[tokio::test]
async fn test_only_scrape_fetches_seed_only() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Seed", r#"<a href="/child">c</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(html_page("Child", ""))
        .expect(0)
        .mount(&server)
        .await;

    let mut spec = job_spec(&format!("{}/", server.uri()), 3);
    spec.mode = CrawlMode::OnlyScrape;
    let job = run_job(spec).await;
    let result = job.result().unwrap();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].status, PageStatus::Scraped);
    assert!(result.pages[0].has_content);
}

#[tokio::test]
async fn test_only_crawl_retains_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Seed", r#"<a href="/child">c</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(html_page("Child", ""))
        .mount(&server)
        .await;

    let mut spec = job_spec(&format!("{}/", server.uri()), 2);
    spec.mode = CrawlMode::OnlyCrawl;
    let job = run_job(spec).await;
    let result = job.result().unwrap();

    assert_eq!(result.pages.len(), 2);
    for page in &result.pages {
        assert_eq!(page.status, PageStatus::Crawled);
        assert!(page.content.is_none());
        assert!(!page.has_content);
    }
}

#[tokio::test]
async fn test_child_pages_disabled_counts_links_without_following() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Seed",
            r#"<a href="/c1">1</a><a href="/c2">2</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c1"))
        .respond_with(html_page("C1", ""))
        .expect(0)
        .mount(&server)
        .await;

    let mut spec = job_spec(&format!("{}/", server.uri()), 3);
    spec.include_child_pages = false;
    let job = run_job(spec).await;
    let result = job.result().unwrap();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].links_found, 2);
    assert_eq!(result.pages[0].status, PageStatus::Scraped);
    assert_eq!(result.total_urls_discovered, 1);
}

#[tokio::test]
async fn test_page_complete_events_and_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", r#"<a href="/b">b</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("B", ""))
        .mount(&server)
        .await;

    let job = Job::new(job_spec(&format!("{}/", server.uri()), 2), test_limits()).unwrap();
    let mut rx = job.subscribe();
    job.start();
    job.wait().await;

    let mut page_events = 0;
    let mut saw_initial = false;
    let mut saw_terminal = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            JobEvent::InitialStatus { .. } => saw_initial = true,
            JobEvent::PageComplete { .. } => page_events += 1,
            JobEvent::JobCompleted { data } => {
                saw_terminal = true;
                assert_eq!(data.state, JobState::Completed);
                assert_eq!(data.urls_processed, 2);
            }
            _ => {}
        }
    }

    assert!(saw_initial);
    assert_eq!(page_events, 2);
    assert!(saw_terminal);
}

#[tokio::test]
async fn test_cancellation_finishes_in_flight_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html_page("Slow", r#"<a href="/next">n</a>"#)
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let job = Job::new(job_spec(&format!("{}/", server.uri()), 3), test_limits()).unwrap();
    job.start();

    // Cancel while the seed fetch is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    job.cancel();
    job.wait().await;

    assert_eq!(job.state(), JobState::Cancelled);
    let result = job.result().unwrap();
    // The in-flight page was completed, not aborted mid-fetch.
    assert_eq!(result.pages.len(), 1);
    assert!(result.pages[0].failure.is_none());
}

#[tokio::test]
async fn test_snapshot_counters_agree_at_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            r#"<a href="/x">x</a><a href="/y">y</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(html_page("X", ""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/y"))
        .respond_with(html_page("Y", ""))
        .mount(&server)
        .await;

    let job = run_job(job_spec(&format!("{}/", server.uri()), 2)).await;
    let snapshot = job.snapshot();

    // P6: at terminal, discovered equals processed when nothing was dropped.
    assert_eq!(snapshot.urls_discovered, 3);
    assert_eq!(snapshot.urls_processed, 3);
    assert_eq!(snapshot.urls_queued, 0);
    assert_eq!(snapshot.current_depth, 1);
    assert!(snapshot.timing.total_ms > 0.0);
    assert!(snapshot.timing.crawling_ms > 0.0);
    assert!(snapshot.started_at.is_some());
    assert!(snapshot.completed_at.is_some());
}

#[tokio::test]
async fn test_invalid_seed_rejected_at_submission() {
    let spec = JobSpec {
        seed_urls: vec!["javascript:void(0)".to_string()],
        mode: CrawlMode::CrawlScrape,
        max_depth: 2,
        worker_count: 2,
        allow_subdomains: false,
        allowed_domains: Vec::new(),
        include_child_pages: true,
    };
    assert!(Job::new(spec, test_limits()).is_err());
}
