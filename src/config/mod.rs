//! Configuration for the crawl engine
//!
//! Job parameters arrive as [`JobSpec`] / [`MultiJobSpec`] records (from the
//! CLI's TOML job files or from an embedding caller), while engine-wide knobs
//! live in [`Limits`] with environment-variable overrides.

mod parser;
mod types;
mod validation;

pub use parser::{load_job_file, JobFile};
pub use types::{CrawlMode, JobSpec, Limits, MultiJobSpec, ScopeSpec};
pub use validation::{clamp_depth, clamp_parallel_scopes, clamp_workers, validate_multi_spec};

/// Input clamp bounds (fixed, not environment-overridable)
pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 5;
pub const MIN_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 10;
pub const MIN_PARALLEL_SCOPES: usize = 1;
pub const MAX_PARALLEL_SCOPES: usize = 5;
