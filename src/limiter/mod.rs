//! Per-host rate limiting with adaptive back-off
//!
//! Every host gets a minimum interval between requests. The interval doubles
//! when the host signals throttling (429/503) up to a cap, decays back toward
//! the baseline on success, and never drops below a robots.txt Crawl-delay
//! floor. One limiter instance is shared by every job of a scheduler: polite
//! crawling is a property of the target host, not of the scope asking.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

/// Browser user-agent pool; one entry is chosen per request to reduce
/// trivial fingerprinting
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Picks a user agent from the pool
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Multiplicative decay applied to the delay after each success
const DECAY_FACTOR: f64 = 0.9;

#[derive(Debug, Clone)]
struct HostState {
    last_request: Option<Instant>,
    current_delay: Duration,
    /// Lower bound for decay; raised by robots.txt Crawl-delay
    floor: Duration,
}

/// Per-host minimum-interval limiter, shared across jobs
pub struct HostLimiter {
    default_delay: Duration,
    max_delay: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HostLimiter {
    pub fn new(default_delay: Duration, max_delay: Duration) -> Self {
        Self {
            default_delay,
            max_delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn state_mut<'a>(
        &self,
        hosts: &'a mut HashMap<String, HostState>,
        host: &str,
    ) -> &'a mut HostState {
        hosts.entry(host.to_string()).or_insert_with(|| HostState {
            last_request: None,
            current_delay: self.default_delay,
            floor: self.default_delay,
        })
    }

    /// Suspends until the host's minimum interval has elapsed, then stamps
    /// the request slot and returns the time waited
    ///
    /// Concurrent acquirers for one host are serialized: only the caller
    /// that wins the slot inside the lock proceeds; the rest re-wait.
    pub async fn acquire(&self, host: &str) -> Duration {
        let start = Instant::now();
        loop {
            let wait = {
                let mut hosts = self.hosts.lock().expect("limiter lock poisoned");
                let state = self.state_mut(&mut hosts, host);
                match state.last_request {
                    Some(last) => {
                        let elapsed = last.elapsed();
                        if elapsed >= state.current_delay {
                            state.last_request = Some(Instant::now());
                            None
                        } else {
                            Some(state.current_delay - elapsed)
                        }
                    }
                    None => {
                        state.last_request = Some(Instant::now());
                        None
                    }
                }
            };

            match wait {
                None => return start.elapsed(),
                Some(remaining) => tokio::time::sleep(remaining).await,
            }
        }
    }

    /// Decays the host's delay toward its floor after a successful response
    pub fn report_success(&self, host: &str) {
        let mut hosts = self.hosts.lock().expect("limiter lock poisoned");
        let state = self.state_mut(&mut hosts, host);
        let decayed = state.current_delay.mul_f64(DECAY_FACTOR);
        state.current_delay = decayed.max(state.floor);
    }

    /// Doubles the host's delay (capped) after a 429/503 rate signal
    pub fn report_throttled(&self, host: &str) {
        let mut hosts = self.hosts.lock().expect("limiter lock poisoned");
        let max_delay = self.max_delay;
        let state = self.state_mut(&mut hosts, host);
        let doubled = state.current_delay.saturating_mul(2);
        state.current_delay = doubled.min(max_delay);
        tracing::debug!(
            "Host {} throttled, delay now {:?}",
            host,
            state.current_delay
        );
    }

    /// Raises the host's delay floor to a robots.txt Crawl-delay
    ///
    /// Only delays at or above the configured default take effect.
    pub fn set_floor(&self, host: &str, delay: Duration) {
        if delay < self.default_delay {
            return;
        }
        let mut hosts = self.hosts.lock().expect("limiter lock poisoned");
        let max_delay = self.max_delay;
        let state = self.state_mut(&mut hosts, host);
        state.floor = delay.min(max_delay);
        if state.current_delay < state.floor {
            state.current_delay = state.floor;
        }
    }

    /// Current minimum interval for a host
    pub fn current_delay(&self, host: &str) -> Duration {
        let mut hosts = self.hosts.lock().expect("limiter lock poisoned");
        self.state_mut(&mut hosts, host).current_delay
    }

    /// Number of hosts with tracked state
    pub fn hosts_tracked(&self) -> usize {
        self.hosts.lock().expect("limiter lock poisoned").len()
    }
}
