//! Seine: a polite, breadth-first web crawler and content scraper
//!
//! This crate implements a bounded multi-worker crawl engine that discovers
//! pages from seed URLs, optionally extracts structured content from each,
//! and streams per-page progress events to subscribers. Crawling is polite:
//! robots.txt is honored, per-host request intervals adapt to server rate
//! signals, and depth-limited frontier expansion keeps jobs bounded.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod fetch;
pub mod limiter;
pub mod output;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for Seine operations
///
/// Per-page failures are *data*, not errors: they flow into
/// [`crawler::PageResult`] and never abort a job. This enum covers job-fatal
/// conditions only.
#[derive(Debug, Error)]
pub enum SeineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} has not reached a terminal state")]
    JobNotFinished(String),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read job file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in job spec: {0}")]
    InvalidUrl(String),

    #[error("Invalid environment override {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Seine operations
pub type Result<T> = std::result::Result<T, SeineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{CrawlMode, JobSpec, Limits, MultiJobSpec, ScopeSpec};
pub use crawler::{
    CrawlResult, Job, JobEvent, JobRegistry, JobSnapshot, JobState, MultiScopeJob, PageResult,
};
pub use url::{canonicalize, ScopePolicy};
