use serde::{Deserialize, Serialize};

/// How a fetched URL's host relates to the job's primary host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostRelation {
    Same,
    Subdomain,
    External,
}

/// Strips a leading `www.` so `www.example.com` and `example.com` compare equal
fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Extracts the registrable root of a host with the last-two-labels heuristic
///
/// `sub.docs.example.com` -> `example.com`. Multi-part public suffixes
/// (`example.co.uk`) are not special-cased.
pub fn root_domain(host: &str) -> String {
    let host = strip_www(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    labels[labels.len() - 2..].join(".")
}

/// Returns true if `host` equals `root` or is a dns-suffix of it
pub fn is_subdomain_of(host: &str, root: &str) -> bool {
    let host = strip_www(host).to_lowercase();
    let root = strip_www(root).to_lowercase();
    host == root || host.ends_with(&format!(".{}", root))
}

/// Host admission test shared by scope policy and submission validation
///
/// Exact match always passes; with `allow_subdomains`, any host under the
/// base domain's root passes.
pub fn host_within_domain(host: &str, base_domain: &str, allow_subdomains: bool) -> bool {
    let host = strip_www(host).to_lowercase();
    let base = strip_www(base_domain).to_lowercase();

    if host == base {
        return true;
    }
    allow_subdomains && is_subdomain_of(&host, &root_domain(&base))
}

/// Classifies a host relative to the primary host
pub fn classify_host(host: &str, primary_host: &str) -> HostRelation {
    let host = strip_www(host).to_lowercase();
    let primary = strip_www(primary_host).to_lowercase();

    if host == primary {
        HostRelation::Same
    } else if is_subdomain_of(&host, &root_domain(&primary)) {
        HostRelation::Subdomain
    } else {
        HostRelation::External
    }
}
