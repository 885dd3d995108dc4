//! URL canonicalization, host classification, and scope policy
//!
//! Two URLs are considered equal by the engine iff their canonical forms are
//! byte-equal; [`canonicalize`] is the single place that form is produced.

mod domain;
mod normalize;
mod scope;

pub use domain::{classify_host, host_within_domain, is_subdomain_of, root_domain, HostRelation};
pub use normalize::canonicalize;
pub use scope::{entry_prefix, first_segment_prefix, ScopeDecision, ScopePolicy, ScopeStats};
