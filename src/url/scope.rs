use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use ::url::Url;

use super::domain::host_within_domain;

/// Why a URL was admitted or rejected by a scope policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeDecision {
    /// In scope; carries the matched path prefix when prefixes are active
    Allowed(Option<String>),
    RejectedScheme,
    RejectedDomain,
    RejectedPath,
}

impl ScopeDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Rejection counters, by cause
///
/// Monotone over a job's lifetime; snapshots read them without locking.
#[derive(Debug, Default)]
pub struct ScopeStats {
    pub checked: AtomicU64,
    pub allowed: AtomicU64,
    pub rejected_scheme: AtomicU64,
    pub rejected_domain: AtomicU64,
    pub rejected_path: AtomicU64,
}

impl ScopeStats {
    pub fn total_rejected(&self) -> u64 {
        self.rejected_scheme.load(Ordering::Relaxed)
            + self.rejected_domain.load(Ordering::Relaxed)
            + self.rejected_path.load(Ordering::Relaxed)
    }
}

/// Host and path-prefix constraints defining which URLs a job will follow
///
/// Immutable for the job's lifetime except for the bounded prefix
/// auto-discovery window: [`extend_prefixes`](Self::extend_prefixes) is a
/// no-op once [`freeze`](Self::freeze) has been called.
pub struct ScopePolicy {
    primary_host: String,
    allow_subdomains: bool,
    allowed_hosts: HashSet<String>,
    /// Normalized prefixes; empty means "any path"
    prefixes: RwLock<Vec<String>>,
    frozen: AtomicBool,
    pub stats: ScopeStats,
}

impl ScopePolicy {
    /// Policy with host constraints only (any path admitted)
    pub fn new(primary_host: &str, allow_subdomains: bool, allowed_hosts: &[String]) -> Self {
        Self::with_prefixes(primary_host, allow_subdomains, allowed_hosts, Vec::new())
    }

    /// Policy with host constraints plus an initial path-prefix set
    pub fn with_prefixes(
        primary_host: &str,
        allow_subdomains: bool,
        allowed_hosts: &[String],
        prefixes: Vec<String>,
    ) -> Self {
        Self {
            primary_host: primary_host.to_lowercase(),
            allow_subdomains,
            allowed_hosts: allowed_hosts.iter().map(|h| h.to_lowercase()).collect(),
            prefixes: RwLock::new(normalize_prefixes(prefixes)),
            frozen: AtomicBool::new(false),
            stats: ScopeStats::default(),
        }
    }

    pub fn primary_host(&self) -> &str {
        &self.primary_host
    }

    pub fn allow_subdomains(&self) -> bool {
        self.allow_subdomains
    }

    /// Current prefix set (includes any auto-discovered entries)
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixes.read().expect("prefix lock poisoned").clone()
    }

    /// Full admission check with stats accounting
    pub fn check(&self, url: &Url) -> ScopeDecision {
        self.stats.checked.fetch_add(1, Ordering::Relaxed);

        if url.scheme() != "http" && url.scheme() != "https" {
            self.stats.rejected_scheme.fetch_add(1, Ordering::Relaxed);
            return ScopeDecision::RejectedScheme;
        }

        let host = match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => {
                self.stats.rejected_scheme.fetch_add(1, Ordering::Relaxed);
                return ScopeDecision::RejectedScheme;
            }
        };

        let host_ok = host_within_domain(&host, &self.primary_host, self.allow_subdomains)
            || self.allowed_hosts.contains(&host);
        if !host_ok {
            self.stats.rejected_domain.fetch_add(1, Ordering::Relaxed);
            return ScopeDecision::RejectedDomain;
        }

        match self.match_prefix(url) {
            MatchOutcome::AnyPath => {
                self.stats.allowed.fetch_add(1, Ordering::Relaxed);
                ScopeDecision::Allowed(None)
            }
            MatchOutcome::Matched(prefix) => {
                self.stats.allowed.fetch_add(1, Ordering::Relaxed);
                ScopeDecision::Allowed(Some(prefix))
            }
            MatchOutcome::NoMatch => {
                self.stats.rejected_path.fetch_add(1, Ordering::Relaxed);
                ScopeDecision::RejectedPath
            }
        }
    }

    /// Returns true iff the URL passes host and path-prefix constraints
    pub fn admits(&self, url: &Url) -> bool {
        self.check(url).is_allowed()
    }

    /// Longest matching prefix, lexicographic tie-break; `None` when the
    /// policy has no prefix constraints or the path does not match
    pub fn matched_prefix(&self, url: &Url) -> Option<String> {
        match self.match_prefix(url) {
            MatchOutcome::Matched(prefix) => Some(prefix),
            _ => None,
        }
    }

    fn match_prefix(&self, url: &Url) -> MatchOutcome {
        let prefixes = self.prefixes.read().expect("prefix lock poisoned");
        if prefixes.is_empty() {
            return MatchOutcome::AnyPath;
        }

        let path = normalize_match_path(url.path());
        let mut best: Option<&String> = None;

        for prefix in prefixes.iter() {
            let matches = prefix == "/" || path == *prefix || path.starts_with(&format!("{}/", prefix));
            if !matches {
                continue;
            }
            best = match best {
                None => Some(prefix),
                Some(current) => {
                    if prefix.len() > current.len()
                        || (prefix.len() == current.len() && prefix < current)
                    {
                        Some(prefix)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        match best {
            Some(prefix) => MatchOutcome::Matched(prefix.clone()),
            None => MatchOutcome::NoMatch,
        }
    }

    /// Adds prefixes discovered during the seed pass; returns those actually
    /// added. Ignored once the policy is frozen.
    pub fn extend_prefixes(&self, candidates: Vec<String>) -> Vec<String> {
        if self.frozen.load(Ordering::Acquire) {
            return Vec::new();
        }

        let mut prefixes = self.prefixes.write().expect("prefix lock poisoned");
        let mut added = Vec::new();
        for candidate in normalize_prefixes(candidates) {
            if !prefixes.contains(&candidate) {
                prefixes.push(candidate.clone());
                added.push(candidate);
            }
        }
        added
    }

    /// Freezes the prefix set for the rest of the job
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

enum MatchOutcome {
    AnyPath,
    Matched(String),
    NoMatch,
}

/// Lowercases a path and strips the trailing slash for boundary matching
fn normalize_match_path(path: &str) -> String {
    let path = path.to_lowercase();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalizes prefixes: leading slash, no trailing slash, lowercase, deduped
fn normalize_prefixes(prefixes: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for prefix in prefixes {
        let mut prefix = prefix.trim().to_lowercase();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        if !normalized.contains(&prefix) {
            normalized.push(prefix);
        }
    }
    normalized
}

/// Derives a scope prefix from an entry URL: the path with its trailing
/// slash stripped (`https://e.com/docs/` -> `/docs`, root -> `/`)
pub fn entry_prefix(url: &Url) -> String {
    normalize_match_path(url.path())
}

/// Derives a candidate prefix from a discovered anchor: its first path
/// segment (`/academics/programs` -> `/academics`)
pub fn first_segment_prefix(url: &Url) -> Option<String> {
    let path = url.path().to_lowercase();
    let segment = path.split('/').find(|s| !s.is_empty())?;
    Some(format!("/{}", segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_admits_primary_host_any_path() {
        let policy = ScopePolicy::new("example.com", false, &[]);
        assert!(policy.admits(&url("https://example.com/anything/at/all")));
        assert!(!policy.admits(&url("https://other.com/")));
    }

    #[test]
    fn test_admits_subdomains_when_allowed() {
        let closed = ScopePolicy::new("example.com", false, &[]);
        let open = ScopePolicy::new("example.com", true, &[]);
        let sub = url("https://docs.example.com/x");
        assert!(!closed.admits(&sub));
        assert!(open.admits(&sub));
    }

    #[test]
    fn test_admits_additional_hosts() {
        let policy = ScopePolicy::new("example.com", false, &["partner.net".to_string()]);
        assert!(policy.admits(&url("https://partner.net/page")));
        assert!(!policy.admits(&url("https://stranger.net/page")));
    }

    #[test]
    fn test_prefix_boundary_match() {
        let policy = ScopePolicy::with_prefixes(
            "example.com",
            false,
            &[],
            vec!["/admissions".to_string()],
        );
        assert!(policy.admits(&url("https://example.com/admissions")));
        assert!(policy.admits(&url("https://example.com/admissions/apply")));
        // Must match at a path boundary, not as a raw string prefix.
        assert!(!policy.admits(&url("https://example.com/admissionsxyz")));
        assert!(!policy.admits(&url("https://example.com/academics")));
    }

    #[test]
    fn test_root_prefix_admits_all_paths() {
        let policy =
            ScopePolicy::with_prefixes("example.com", false, &[], vec!["/".to_string()]);
        assert!(policy.admits(&url("https://example.com/anything")));
    }

    #[test]
    fn test_matched_prefix_longest_wins() {
        let policy = ScopePolicy::with_prefixes(
            "example.com",
            false,
            &[],
            vec!["/a".to_string(), "/a/b".to_string()],
        );
        assert_eq!(
            policy.matched_prefix(&url("https://example.com/a/b/c")),
            Some("/a/b".to_string())
        );
        assert_eq!(
            policy.matched_prefix(&url("https://example.com/a/x")),
            Some("/a".to_string())
        );
    }

    #[test]
    fn test_extend_then_freeze() {
        let policy = ScopePolicy::with_prefixes(
            "example.com",
            false,
            &[],
            vec!["/docs".to_string()],
        );

        let added = policy.extend_prefixes(vec!["/guides/".to_string(), "/docs".to_string()]);
        assert_eq!(added, vec!["/guides".to_string()]);
        assert!(policy.admits(&url("https://example.com/guides/intro")));

        policy.freeze();
        let added = policy.extend_prefixes(vec!["/blog".to_string()]);
        assert!(added.is_empty());
        assert!(!policy.admits(&url("https://example.com/blog/post")));
    }

    #[test]
    fn test_rejection_stats() {
        let policy = ScopePolicy::with_prefixes(
            "example.com",
            false,
            &[],
            vec!["/docs".to_string()],
        );
        policy.check(&url("https://example.com/docs/a"));
        policy.check(&url("https://example.com/blog/b"));
        policy.check(&url("https://other.com/docs/c"));

        assert_eq!(policy.stats.checked.load(Ordering::Relaxed), 3);
        assert_eq!(policy.stats.allowed.load(Ordering::Relaxed), 1);
        assert_eq!(policy.stats.rejected_path.load(Ordering::Relaxed), 1);
        assert_eq!(policy.stats.rejected_domain.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_entry_prefix() {
        assert_eq!(entry_prefix(&url("https://e.com/docs/")), "/docs");
        assert_eq!(entry_prefix(&url("https://e.com/docs/intro")), "/docs/intro");
        assert_eq!(entry_prefix(&url("https://e.com/")), "/");
    }

    #[test]
    fn test_first_segment_prefix() {
        assert_eq!(
            first_segment_prefix(&url("https://e.com/academics/programs")),
            Some("/academics".to_string())
        );
        assert_eq!(first_segment_prefix(&url("https://e.com/")), None);
    }
}
