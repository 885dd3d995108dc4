//! Per-host robots.txt fetching and caching
//!
//! Policies are fetched lazily, one request per host origin, and memoized
//! for the lifetime of the job. Fetch failures are cached as allow-all
//! (fail-open) with the failure reason retained so callers can tell the
//! difference from an explicit allow.

mod parser;

pub use parser::ParsedRobots;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use ::url::Url;

/// Outcome of a robots check for one URL
#[derive(Debug, Clone)]
pub struct RobotsVerdict {
    pub allowed: bool,
    /// Crawl-delay from robots.txt, when present
    pub crawl_delay: Option<Duration>,
}

struct CachedPolicy {
    robots: ParsedRobots,
    /// Set when the policy is a fail-open placeholder rather than a real fetch
    fetch_error: Option<String>,
}

/// Job-lifetime robots.txt cache
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedPolicy>>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: &str, timeout: Duration) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Checks `url` against its host's robots.txt, fetching it on first use
    ///
    /// Concurrent checks for the same host coalesce onto a single fetch;
    /// checks for other hosts are never blocked by it.
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        let origin = match origin_of(url) {
            Some(origin) => origin,
            None => {
                return RobotsVerdict {
                    allowed: true,
                    crawl_delay: None,
                }
            }
        };

        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(origin.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let policy = cell.get_or_init(|| self.load(origin.clone())).await;

        RobotsVerdict {
            allowed: policy.robots.is_allowed(url.as_str(), &self.user_agent),
            crawl_delay: policy.robots.crawl_delay(&self.user_agent),
        }
    }

    /// Returns the recorded fetch failure for a host origin, if the cached
    /// policy is a fail-open placeholder
    pub async fn fetch_error(&self, url: &Url) -> Option<String> {
        let origin = origin_of(url)?;
        let entries = self.entries.lock().await;
        entries
            .get(&origin)
            .and_then(|cell| cell.get())
            .and_then(|policy| policy.fetch_error.clone())
    }

    async fn load(&self, origin: String) -> CachedPolicy {
        let robots_url = format!("{}/robots.txt", origin);
        let request = self
            .client
            .get(&robots_url)
            .timeout(self.timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent);

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(content) => {
                    tracing::debug!("Loaded robots.txt for {}", origin);
                    CachedPolicy {
                        robots: ParsedRobots::from_content(&content),
                        fetch_error: None,
                    }
                }
                Err(e) => {
                    tracing::debug!("robots.txt body read failed for {}: {}", origin, e);
                    CachedPolicy {
                        robots: ParsedRobots::allow_all(),
                        fetch_error: Some(e.to_string()),
                    }
                }
            },
            Ok(response) => {
                // Missing or errored robots.txt means the host imposes no policy.
                tracing::debug!(
                    "No robots.txt for {} (status={})",
                    origin,
                    response.status()
                );
                CachedPolicy {
                    robots: ParsedRobots::allow_all(),
                    fetch_error: None,
                }
            }
            Err(e) => {
                tracing::warn!("robots.txt fetch failed for {}: {} - allowing all", origin, e);
                CachedPolicy {
                    robots: ParsedRobots::allow_all(),
                    fetch_error: Some(e.to_string()),
                }
            }
        }
    }
}

/// `scheme://host[:port]` of a URL
fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        let url = Url::parse("https://example.com/a/b?q=1").unwrap();
        assert_eq!(origin_of(&url), Some("https://example.com".to_string()));

        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(origin_of(&url), Some("http://example.com:8080".to_string()));
    }
}
