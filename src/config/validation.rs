//! Input clamps and job-submission validation
//!
//! Out-of-range numeric inputs are clamped silently (the original service
//! treats these as soft bounds); structurally invalid submissions are
//! job-fatal and rejected with a structured reason.

use super::types::MultiJobSpec;
use super::{MAX_DEPTH, MAX_PARALLEL_SCOPES, MAX_WORKERS, MIN_DEPTH, MIN_PARALLEL_SCOPES, MIN_WORKERS};
use crate::url::{canonicalize, host_within_domain};
use crate::ConfigError;

/// Clamps a requested depth to [MIN_DEPTH, MAX_DEPTH]
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

/// Clamps a requested worker count to [MIN_WORKERS, MAX_WORKERS]
pub fn clamp_workers(workers: usize) -> usize {
    workers.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Clamps a requested scope parallelism to [1, MAX_PARALLEL_SCOPES]
pub fn clamp_parallel_scopes(parallel: usize) -> usize {
    parallel.clamp(MIN_PARALLEL_SCOPES, MAX_PARALLEL_SCOPES)
}

/// Validates a multi-scope submission before any job is constructed
///
/// Each active scope must have a non-empty name and at least one entry URL
/// that canonicalizes and resolves under the declared base domain. At least
/// one scope must be active.
pub fn validate_multi_spec(spec: &MultiJobSpec) -> Result<(), ConfigError> {
    let active: Vec<_> = spec.scopes.iter().filter(|s| s.active).collect();
    if active.is_empty() {
        return Err(ConfigError::Validation(
            "at least one active scope is required".to_string(),
        ));
    }

    let base_domain = spec.domain.trim().to_lowercase();
    if base_domain.is_empty() {
        return Err(ConfigError::Validation("base domain is empty".to_string()));
    }

    for scope in active {
        if scope.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "scope '{}' has an empty name",
                scope.id
            )));
        }

        let mut valid_entries = 0usize;
        for entry in &scope.entry_urls {
            let url = match canonicalize(entry, None) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let host = url.host_str().unwrap_or_default();
            if host_within_domain(host, &base_domain, spec.allow_subdomains) {
                valid_entries += 1;
            } else {
                return Err(ConfigError::InvalidUrl(format!(
                    "entry URL {} of scope '{}' does not resolve under {}",
                    entry, scope.name, base_domain
                )));
            }
        }

        if valid_entries == 0 {
            return Err(ConfigError::Validation(format!(
                "scope '{}' has no valid entry URLs",
                scope.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlMode, ScopeSpec};

    fn scope(id: &str, name: &str, urls: &[&str], active: bool) -> ScopeSpec {
        ScopeSpec {
            id: id.to_string(),
            name: name.to_string(),
            entry_urls: urls.iter().map(|u| u.to_string()).collect(),
            active,
            max_depth: None,
        }
    }

    fn multi_spec(scopes: Vec<ScopeSpec>) -> MultiJobSpec {
        MultiJobSpec {
            domain: "example.com".to_string(),
            scopes,
            mode: CrawlMode::CrawlScrape,
            max_depth: 3,
            worker_count: 4,
            allow_subdomains: false,
            include_child_pages: true,
            parallel_scopes: 2,
            auto_discover_prefixes: false,
        }
    }

    #[test]
    fn test_clamp_depth() {
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(3), 3);
        assert_eq!(clamp_depth(99), 5);
    }

    #[test]
    fn test_clamp_workers() {
        assert_eq!(clamp_workers(0), 2);
        assert_eq!(clamp_workers(4), 4);
        assert_eq!(clamp_workers(64), 10);
    }

    #[test]
    fn test_clamp_parallel_scopes() {
        assert_eq!(clamp_parallel_scopes(0), 1);
        assert_eq!(clamp_parallel_scopes(3), 3);
        assert_eq!(clamp_parallel_scopes(12), 5);
    }

    #[test]
    fn test_valid_multi_spec() {
        let spec = multi_spec(vec![scope(
            "docs",
            "Docs",
            &["https://example.com/docs/intro"],
            true,
        )]);
        assert!(validate_multi_spec(&spec).is_ok());
    }

    #[test]
    fn test_reject_no_active_scopes() {
        let spec = multi_spec(vec![scope(
            "docs",
            "Docs",
            &["https://example.com/docs/"],
            false,
        )]);
        assert!(validate_multi_spec(&spec).is_err());
    }

    #[test]
    fn test_reject_empty_scope_name() {
        let spec = multi_spec(vec![scope("docs", "  ", &["https://example.com/docs/"], true)]);
        assert!(validate_multi_spec(&spec).is_err());
    }

    #[test]
    fn test_reject_entry_outside_domain() {
        let spec = multi_spec(vec![scope("docs", "Docs", &["https://other.com/docs/"], true)]);
        assert!(validate_multi_spec(&spec).is_err());
    }

    #[test]
    fn test_subdomain_entry_requires_flag() {
        let mut spec = multi_spec(vec![scope(
            "docs",
            "Docs",
            &["https://docs.example.com/guide/"],
            true,
        )]);
        assert!(validate_multi_spec(&spec).is_err());

        spec.allow_subdomains = true;
        assert!(validate_multi_spec(&spec).is_ok());
    }
}
