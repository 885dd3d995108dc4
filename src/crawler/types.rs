use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CrawlMode;

/// Outcome class of one processed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Fetched and content extracted
    Scraped,
    /// Fetched; links followed but content not retained
    Crawled,
    /// Recorded without processing (child pages disabled)
    Skipped,
    /// A crawl- or scrape-phase failure occurred
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::Crawled => "crawled",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

/// Why a page was recorded as skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ChildPagesDisabled,
}

/// Which stage of processing a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// Network fetch or robots gate
    Crawl,
    /// Content extraction after a successful fetch
    Scrape,
}

/// Exhaustive failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Timeout,
    DnsError,
    SslError,
    ConnectionError,
    RedirectLoop,
    Http4xx,
    Http5xx,
    RobotsBlocked,
    ParseError,
    SelectorMismatch,
    EmptyContent,
    Unknown,
}

/// Full description of a per-page failure
///
/// Presence of this record implies a complete substructure; absence is the
/// "no failure" case. Half-populated failure rows cannot be expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub phase: FailurePhase,
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// Per-page timing breakdown in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PageTiming {
    pub total_ms: f64,
    pub crawl_ms: f64,
    pub scrape_ms: f64,
    pub time_before_failure_ms: f64,
}

/// Host classification of a page relative to the job's primary host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    SameDomainSuccess,
    ExternalDomain,
    Error,
}

/// The job's primary output row: one processed page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub headings: Vec<String>,
    /// Anchor count before scope/visited filtering
    pub links_found: usize,
    pub status: PageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    pub has_content: bool,
    pub timing: PageTiming,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    pub is_same_domain: bool,
    pub is_subdomain: bool,
    pub category: PageCategory,
    /// Which scope prefix admitted this URL (multi-scope jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_prefix: Option<String>,
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Aggregate timing for a job, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingMetrics {
    pub url_discovery_ms: f64,
    pub crawling_ms: f64,
    pub scraping_ms: f64,
    pub total_ms: f64,
}

/// URLs visited at one depth level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthStats {
    pub depth: u32,
    pub urls_count: usize,
    pub urls: Vec<String>,
}

/// Observable state of a job at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub state: JobState,
    pub mode: CrawlMode,
    pub max_depth: u32,
    pub worker_count: usize,
    /// Max depth of any PageResult so far; monotonically non-decreasing
    pub current_depth: u32,
    pub urls_discovered: u64,
    pub urls_processed: u64,
    pub urls_queued: u64,
    pub urls_skipped_out_of_scope: u64,
    pub pages_scraped: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub urls_by_depth: Vec<DepthStats>,
    pub timing: TimingMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Scope identity when this job belongs to a multi-scope crawl
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_prefixes: Vec<String>,
}

/// Complete results of a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub job_id: String,
    pub seed_urls: Vec<String>,
    pub mode: CrawlMode,
    pub max_depth: u32,
    pub worker_count: usize,
    pub state: JobState,
    pub timing: TimingMetrics,
    pub urls_by_depth: Vec<DepthStats>,
    pub pages: Vec<PageResult>,
    pub total_urls_discovered: u64,
    pub total_pages_scraped: u64,
    /// Derived timing shares; 0 when total_ms is 0
    pub url_discovery_pct: f64,
    pub crawling_pct: f64,
    pub scraping_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_prefixes: Vec<String>,
}

/// Aggregate snapshot of a multi-scope job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiJobSnapshot {
    pub job_id: String,
    pub domain: String,
    pub state: JobState,
    pub mode: CrawlMode,
    pub total_scopes: usize,
    pub scopes_pending: usize,
    pub scopes_running: usize,
    pub scopes_completed: usize,
    pub scopes_failed: usize,
    pub scopes_cancelled: usize,
    pub total_urls_discovered: u64,
    pub total_urls_processed: u64,
    pub total_urls_out_of_scope: u64,
    pub scopes: Vec<JobSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Complete results of a finished multi-scope job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiCrawlResult {
    pub job_id: String,
    pub domain: String,
    pub state: JobState,
    pub mode: CrawlMode,
    pub scopes: Vec<CrawlResult>,
    pub total_urls_discovered: u64,
    pub total_urls_processed: u64,
    pub total_pages_scraped: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PageResult {
    /// True for rows that count toward `urls_processed`
    ///
    /// Synthetic skipped rows are reporting-only and excluded.
    pub fn counts_as_processed(&self) -> bool {
        self.status != PageStatus::Skipped
    }
}
