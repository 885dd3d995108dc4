//! TOML job-file loading for the CLI
//!
//! A job file contains either a `[job]` table (single-scope crawl) or a
//! `[multi]` table (multi-scope crawl), never both.

use std::path::Path;

use serde::Deserialize;

use super::types::{JobSpec, MultiJobSpec};
use crate::{ConfigError, ConfigResult};

/// Parsed contents of a job file
#[derive(Debug, Deserialize)]
pub struct JobFile {
    pub job: Option<JobSpec>,
    pub multi: Option<MultiJobSpec>,
}

/// Loads and validates a TOML job file
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, the TOML is
/// malformed, or the file contains neither/both of `[job]` and `[multi]`.
pub fn load_job_file(path: &Path) -> ConfigResult<JobFile> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: JobFile = toml::from_str(&raw)?;

    match (&parsed.job, &parsed.multi) {
        (None, None) => Err(ConfigError::Validation(
            "job file must contain a [job] or [multi] table".to_string(),
        )),
        (Some(_), Some(_)) => Err(ConfigError::Validation(
            "job file cannot contain both [job] and [multi] tables".to_string(),
        )),
        _ => Ok(parsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlMode;

    fn parse(raw: &str) -> ConfigResult<JobFile> {
        let parsed: JobFile = toml::from_str(raw).map_err(ConfigError::Parse)?;
        match (&parsed.job, &parsed.multi) {
            (None, None) => Err(ConfigError::Validation("empty".to_string())),
            (Some(_), Some(_)) => Err(ConfigError::Validation("both".to_string())),
            _ => Ok(parsed),
        }
    }

    #[test]
    fn test_parse_single_job() {
        let file = parse(
            r#"
            [job]
            seed_urls = ["https://example.com/"]
            mode = "crawl_scrape"
            max_depth = 2
            worker_count = 4
            "#,
        )
        .unwrap();

        let job = file.job.unwrap();
        assert_eq!(job.seed_urls, vec!["https://example.com/"]);
        assert_eq!(job.mode, CrawlMode::CrawlScrape);
        assert_eq!(job.max_depth, 2);
    }

    #[test]
    fn test_parse_multi_job() {
        let file = parse(
            r#"
            [multi]
            domain = "example.com"
            max_depth = 3
            parallel_scopes = 2

            [[multi.scopes]]
            id = "docs"
            name = "Documentation"
            entry_urls = ["https://example.com/docs/"]

            [[multi.scopes]]
            id = "blog"
            name = "Blog"
            entry_urls = ["https://example.com/blog/"]
            active = false
            "#,
        )
        .unwrap();

        let multi = file.multi.unwrap();
        assert_eq!(multi.scopes.len(), 2);
        assert!(multi.scopes[0].active);
        assert!(!multi.scopes[1].active);
        assert_eq!(multi.scopes[0].max_depth, None);
    }

    #[test]
    fn test_reject_empty_file() {
        assert!(parse("").is_err());
    }

    #[test]
    fn test_reject_both_tables() {
        let raw = r#"
            [job]
            seed_urls = ["https://example.com/"]

            [multi]
            domain = "example.com"
            scopes = []
            "#;
        assert!(parse(raw).is_err());
    }
}
