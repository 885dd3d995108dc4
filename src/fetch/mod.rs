//! Single-URL HTTP fetching with retries and failure classification
//!
//! The fetcher owns no crawl policy: robots gating and scope checks happen
//! before it is called. It reports rate signals (429/503) back to the shared
//! [`HostLimiter`] and classifies every failure into the engine's taxonomy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use ::url::Url;

use crate::config::Limits;
use crate::crawler::{FailureInfo, FailurePhase, FailureType};
use crate::limiter::{random_user_agent, HostLimiter};

/// Base delay for exponential retry back-off
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Successful fetch of one URL
#[derive(Debug)]
pub struct FetchSuccess {
    pub body: String,
    pub final_url: Url,
    pub http_status: u16,
    /// Wall time across all attempts, excluding back-off sleeps
    pub elapsed: Duration,
}

/// Classified fetch failure
#[derive(Debug)]
pub struct FetchFailure {
    pub failure: FailureInfo,
    /// Accumulated attempt time before the failure was final
    pub elapsed: Duration,
}

pub type FetchOutcome = std::result::Result<FetchSuccess, FetchFailure>;

/// HTTP fetcher shared by a job's workers
pub struct Fetcher {
    client: reqwest::Client,
    limits: Arc<Limits>,
    limiter: Arc<HostLimiter>,
    /// Fixed user agent override; `None` rotates through the pool
    fixed_user_agent: Option<String>,
}

impl Fetcher {
    /// Builds the engine's HTTP client from the configured limits
    pub fn build_client(limits: &Limits) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .redirect(Policy::limited(10))
            .timeout(limits.request_timeout)
            .connect_timeout(limits.connect_timeout)
            .pool_max_idle_per_host((limits.connection_pool_size / 10).max(1))
            .gzip(true)
            .brotli(true)
            .build()
    }

    pub fn new(client: reqwest::Client, limits: Arc<Limits>, limiter: Arc<HostLimiter>) -> Self {
        Self {
            client,
            limits,
            limiter,
            fixed_user_agent: None,
        }
    }

    /// Pins every request to one user agent instead of rotating
    pub fn with_fixed_user_agent(mut self, user_agent: &str) -> Self {
        self.fixed_user_agent = Some(user_agent.to_string());
        self
    }

    fn user_agent(&self) -> &str {
        match &self.fixed_user_agent {
            Some(ua) => ua,
            None => random_user_agent(),
        }
    }

    /// Fetches a URL, retrying transient failures with jittered back-off
    ///
    /// Retriable: timeout, connection error, HTTP 5xx, HTTP 429. Never
    /// retried: DNS failures, TLS failures, other 4xx. The returned elapsed
    /// time accumulates attempt durations only, not back-off sleeps.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let host = url.host_str().unwrap_or_default().to_string();
        let mut accumulated = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            let attempt_start = Instant::now();
            let response = self
                .client
                .get(url.clone())
                .header(reqwest::header::USER_AGENT, self.user_agent())
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let final_url = response.url().clone();
                        match response.text().await {
                            Ok(body) => {
                                accumulated += attempt_start.elapsed();
                                self.limiter.report_success(&host);
                                tracing::debug!(
                                    "Fetched {} ({} bytes, attempt {})",
                                    url,
                                    body.len(),
                                    attempt + 1
                                );
                                return Ok(FetchSuccess {
                                    body,
                                    final_url,
                                    http_status: status.as_u16(),
                                    elapsed: accumulated,
                                });
                            }
                            Err(e) => {
                                accumulated += attempt_start.elapsed();
                                let failure = crawl_failure(
                                    classify_error(&e),
                                    Some(e.to_string()),
                                    None,
                                );
                                if self.should_retry(&failure, attempt) {
                                    attempt += 1;
                                    tokio::time::sleep(backoff_delay(attempt - 1)).await;
                                    continue;
                                }
                                return Err(FetchFailure {
                                    failure,
                                    elapsed: accumulated,
                                });
                            }
                        }
                    }

                    accumulated += attempt_start.elapsed();
                    let code = status.as_u16();

                    if code == StatusCode::TOO_MANY_REQUESTS.as_u16()
                        || code == StatusCode::SERVICE_UNAVAILABLE.as_u16()
                    {
                        self.limiter.report_throttled(&host);
                    }

                    let failure = classify_status(status);
                    if self.should_retry(&failure, attempt) {
                        tracing::debug!(
                            "HTTP {} from {}, retry {}/{}",
                            code,
                            url,
                            attempt + 1,
                            self.limits.max_retries
                        );
                        attempt += 1;
                        tokio::time::sleep(backoff_delay(attempt - 1)).await;
                        continue;
                    }
                    return Err(FetchFailure {
                        failure,
                        elapsed: accumulated,
                    });
                }
                Err(e) => {
                    accumulated += attempt_start.elapsed();
                    let failure = crawl_failure(classify_error(&e), Some(e.to_string()), None);
                    if self.should_retry(&failure, attempt) {
                        tracing::debug!(
                            "Fetch error for {} ({}), retry {}/{}",
                            url,
                            e,
                            attempt + 1,
                            self.limits.max_retries
                        );
                        attempt += 1;
                        tokio::time::sleep(backoff_delay(attempt - 1)).await;
                        continue;
                    }
                    return Err(FetchFailure {
                        failure,
                        elapsed: accumulated,
                    });
                }
            }
        }
    }

    fn should_retry(&self, failure: &FailureInfo, attempt: u32) -> bool {
        attempt < self.limits.max_retries && is_retriable(failure)
    }
}

/// Transient failures worth retrying: timeout, connection error, 5xx, 429
pub fn is_retriable(failure: &FailureInfo) -> bool {
    match failure.failure_type {
        FailureType::Timeout | FailureType::ConnectionError | FailureType::Http5xx => true,
        FailureType::Http4xx => failure.http_status == Some(429),
        _ => false,
    }
}

/// Exponential back-off with +/-20% jitter: 0.5s, 1s, 2s, ...
fn backoff_delay(completed_attempts: u32) -> Duration {
    let base = BACKOFF_BASE.as_secs_f64() * 2f64.powi(completed_attempts as i32);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_secs_f64(base * jitter)
}

fn crawl_failure(
    failure_type: FailureType,
    reason: Option<String>,
    http_status: Option<u16>,
) -> FailureInfo {
    FailureInfo {
        phase: FailurePhase::Crawl,
        failure_type,
        reason,
        http_status,
    }
}

fn classify_status(status: StatusCode) -> FailureInfo {
    let code = status.as_u16();
    let failure_type = if status.is_client_error() {
        FailureType::Http4xx
    } else if status.is_server_error() {
        FailureType::Http5xx
    } else {
        FailureType::Unknown
    };
    crawl_failure(
        failure_type,
        Some(format!("HTTP {}", code)),
        Some(code),
    )
}

/// Maps a reqwest error onto the taxonomy, most specific class first
///
/// DNS and TLS failures surface inside reqwest's connect errors, so the
/// source chain is inspected before the generic connect check.
fn classify_error(e: &reqwest::Error) -> FailureType {
    if e.is_timeout() {
        return FailureType::Timeout;
    }

    let chain = error_chain(e);
    if chain.contains("dns") || chain.contains("name resolution") || chain.contains("lookup") {
        return FailureType::DnsError;
    }
    if chain.contains("certificate") || chain.contains("ssl") || chain.contains("tls") {
        return FailureType::SslError;
    }
    if e.is_connect() {
        return FailureType::ConnectionError;
    }
    if e.is_redirect() {
        return FailureType::RedirectLoop;
    }
    FailureType::Unknown
}

/// Lowercased concatenation of an error and its sources
fn error_chain(e: &reqwest::Error) -> String {
    let mut chain = e.to_string().to_lowercase();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        chain.push_str(" / ");
        chain.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(failure_type: FailureType, http_status: Option<u16>) -> FailureInfo {
        FailureInfo {
            phase: FailurePhase::Crawl,
            failure_type,
            reason: None,
            http_status,
        }
    }

    #[test]
    fn test_retriable_failures() {
        assert!(is_retriable(&failure(FailureType::Timeout, None)));
        assert!(is_retriable(&failure(FailureType::ConnectionError, None)));
        assert!(is_retriable(&failure(FailureType::Http5xx, Some(502))));
        assert!(is_retriable(&failure(FailureType::Http4xx, Some(429))));
    }

    #[test]
    fn test_non_retriable_failures() {
        assert!(!is_retriable(&failure(FailureType::DnsError, None)));
        assert!(!is_retriable(&failure(FailureType::SslError, None)));
        assert!(!is_retriable(&failure(FailureType::Http4xx, Some(404))));
        assert!(!is_retriable(&failure(FailureType::RedirectLoop, None)));
        assert!(!is_retriable(&failure(FailureType::RobotsBlocked, None)));
        assert!(!is_retriable(&failure(FailureType::Unknown, None)));
    }

    #[test]
    fn test_backoff_grows_with_jitter_bounds() {
        for attempt in 0..3u32 {
            let expected = 0.5 * 2f64.powi(attempt as i32);
            for _ in 0..20 {
                let delay = backoff_delay(attempt).as_secs_f64();
                assert!(delay >= expected * 0.8 - 1e-9, "delay {} too small", delay);
                assert!(delay <= expected * 1.2 + 1e-9, "delay {} too large", delay);
            }
        }
    }

    #[test]
    fn test_classify_status() {
        let not_found = classify_status(StatusCode::NOT_FOUND);
        assert_eq!(not_found.failure_type, FailureType::Http4xx);
        assert_eq!(not_found.http_status, Some(404));

        let bad_gateway = classify_status(StatusCode::BAD_GATEWAY);
        assert_eq!(bad_gateway.failure_type, FailureType::Http5xx);
        assert_eq!(bad_gateway.http_status, Some(502));
    }

    #[test]
    fn test_client_pool_sizing() {
        let limits = Limits::default();
        // 100-connection pool maps to 10 idle connections per host.
        assert!(Fetcher::build_client(&limits).is_ok());
    }
}
