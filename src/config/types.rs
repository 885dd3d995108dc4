use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Crawl execution modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Fetch pages and follow links, but do not retain content
    OnlyCrawl,
    /// Fetch and extract the seed pages only; no link following
    OnlyScrape,
    /// Fetch, extract content, and follow links (default)
    CrawlScrape,
}

impl Default for CrawlMode {
    fn default() -> Self {
        Self::CrawlScrape
    }
}

impl CrawlMode {
    /// Returns true if this mode retains extracted content
    pub fn scrapes(&self) -> bool {
        matches!(self, Self::OnlyScrape | Self::CrawlScrape)
    }

    /// Returns true if this mode follows links into child pages
    pub fn follows_links(&self) -> bool {
        !matches!(self, Self::OnlyScrape)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnlyCrawl => "only_crawl",
            Self::OnlyScrape => "only_scrape",
            Self::CrawlScrape => "crawl_scrape",
        }
    }
}

/// Parameters for a single-scope crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Starting URLs; at least one must canonicalize and pass the scope policy
    pub seed_urls: Vec<String>,

    #[serde(default)]
    pub mode: CrawlMode,

    /// Maximum BFS depth, clamped to [1, 5]
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Concurrent workers, clamped to [2, 10]
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Whether hosts under the seed's registrable domain are in scope
    #[serde(default)]
    pub allow_subdomains: bool,

    /// Additional hosts admitted by the scope policy
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// When false, child links are counted but never enqueued
    #[serde(default = "default_true")]
    pub include_child_pages: bool,
}

fn default_max_depth() -> u32 {
    3
}

fn default_worker_count() -> usize {
    4
}

fn default_true() -> bool {
    true
}

/// One named scope of a multi-scope crawl
///
/// A scope's path prefixes are derived from the directory components of its
/// entry URLs; the scope's job only follows links under those prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSpec {
    pub id: String,
    pub name: String,
    pub entry_urls: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Per-scope depth override; falls back to the job-wide max_depth
    #[serde(default)]
    pub max_depth: Option<u32>,
}

/// Parameters for a multi-scope crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiJobSpec {
    /// Base domain all scope entry URLs must resolve under
    pub domain: String,

    pub scopes: Vec<ScopeSpec>,

    #[serde(default)]
    pub mode: CrawlMode,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Global worker budget shared by all scopes, clamped to [2, 10]
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default)]
    pub allow_subdomains: bool,

    #[serde(default = "default_true")]
    pub include_child_pages: bool,

    /// How many scope jobs run concurrently, clamped to [1, 5]
    #[serde(default = "default_parallel_scopes")]
    pub parallel_scopes: usize,

    /// Extend each scope's prefix set from anchors shared by >= 2 entry pages
    #[serde(default)]
    pub auto_discover_prefixes: bool,
}

fn default_parallel_scopes() -> usize {
    2
}

/// Engine-wide limits with environment overrides
///
/// Every field has a built-in default and a `SEINE_*` environment key. Values are
/// read once at construction; a job holds its limits for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Per-attempt fetch deadline
    pub request_timeout: Duration,
    /// TCP connect deadline
    pub connect_timeout: Duration,
    /// Retry budget for transient fetch failures
    pub max_retries: u32,
    /// HTTP connection pool cap
    pub connection_pool_size: usize,
    /// Baseline per-host interval between requests
    pub default_delay: Duration,
    /// Upper bound for the adaptive per-host delay
    pub max_delay: Duration,
    /// Extracted content is truncated to this many characters
    pub max_content_length: usize,
    /// Extracted heading list is truncated to this many entries
    pub max_headings: usize,
    /// robots.txt fetch deadline
    pub robots_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            connection_pool_size: 100,
            default_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_content_length: 50_000,
            max_headings: 50,
            robots_timeout: Duration::from_secs(10),
        }
    }
}

impl Limits {
    /// Builds limits from defaults plus `SEINE_*` environment overrides
    ///
    /// Unparseable values are ignored with a warning rather than failing the
    /// job; a bad override should not take the whole engine down.
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(secs) = env_f64("SEINE_REQUEST_TIMEOUT") {
            limits.request_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = env_f64("SEINE_CONNECT_TIMEOUT") {
            limits.connect_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(n) = env_u64("SEINE_MAX_RETRIES") {
            limits.max_retries = n as u32;
        }
        if let Some(n) = env_u64("SEINE_CONNECTION_POOL_SIZE") {
            limits.connection_pool_size = n as usize;
        }
        if let Some(secs) = env_f64("SEINE_DEFAULT_DELAY") {
            limits.default_delay = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = env_f64("SEINE_MAX_DELAY") {
            limits.max_delay = Duration::from_secs_f64(secs);
        }
        if let Some(n) = env_u64("SEINE_MAX_CONTENT_LENGTH") {
            limits.max_content_length = n as usize;
        }
        if let Some(n) = env_u64("SEINE_MAX_HEADINGS") {
            limits.max_headings = n as usize;
        }

        limits
    }
}

fn env_f64(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 => Some(v),
        _ => {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}
