//! Result summaries for the CLI
//!
//! Derived timing shares plus a formatted text rendering of crawl results.
//! Structured export beyond JSON is a consumer concern, not the engine's.

use crate::crawler::{CrawlResult, MultiCrawlResult, PageStatus, TimingMetrics};

/// Derived timing shares: (url_discovery_pct, crawling_pct, scraping_pct)
///
/// All zero when `total_ms` is zero.
pub fn timing_percentages(timing: &TimingMetrics) -> (f64, f64, f64) {
    if timing.total_ms <= 0.0 {
        return (0.0, 0.0, 0.0);
    }
    (
        timing.url_discovery_ms / timing.total_ms * 100.0,
        timing.crawling_ms / timing.total_ms * 100.0,
        timing.scraping_ms / timing.total_ms * 100.0,
    )
}

/// Renders a single-job result as a human-readable summary
pub fn render_summary(result: &CrawlResult) -> String {
    let mut out = String::new();

    out.push_str("=== Crawl Summary ===\n\n");
    out.push_str(&format!("Job: {} ({})\n", result.job_id, result.state.as_str()));
    out.push_str(&format!("Mode: {}\n", result.mode.as_str()));
    out.push_str(&format!("Seeds: {}\n", result.seed_urls.join(", ")));
    if let Some(error) = &result.error {
        out.push_str(&format!("Error: {}\n", error));
    }
    out.push('\n');

    out.push_str("Pages:\n");
    out.push_str(&format!("  Discovered: {}\n", result.total_urls_discovered));
    out.push_str(&format!("  Processed: {}\n", result.pages.len()));
    out.push_str(&format!("  Scraped: {}\n", result.total_pages_scraped));
    let failed = result
        .pages
        .iter()
        .filter(|p| p.status == PageStatus::Error)
        .count();
    out.push_str(&format!("  Failed: {}\n", failed));
    out.push('\n');

    out.push_str("Depth breakdown:\n");
    for level in &result.urls_by_depth {
        out.push_str(&format!("  depth {}: {} URLs\n", level.depth, level.urls_count));
    }
    out.push('\n');

    out.push_str("Timing:\n");
    out.push_str(&format!("  Total: {:.0}ms\n", result.timing.total_ms));
    out.push_str(&format!(
        "  Discovery: {:.0}ms ({:.1}%)\n",
        result.timing.url_discovery_ms, result.url_discovery_pct
    ));
    out.push_str(&format!(
        "  Crawling: {:.0}ms ({:.1}%)\n",
        result.timing.crawling_ms, result.crawling_pct
    ));
    out.push_str(&format!(
        "  Scraping: {:.0}ms ({:.1}%)\n",
        result.timing.scraping_ms, result.scraping_pct
    ));

    out
}

/// Renders a multi-scope result as a human-readable summary
pub fn render_multi_summary(result: &MultiCrawlResult) -> String {
    let mut out = String::new();

    out.push_str("=== Multi-Scope Crawl Summary ===\n\n");
    out.push_str(&format!("Job: {} ({})\n", result.job_id, result.state.as_str()));
    out.push_str(&format!("Domain: {}\n", result.domain));
    out.push_str(&format!("Scopes: {}\n", result.scopes.len()));
    out.push_str(&format!(
        "Totals: {} discovered, {} processed, {} scraped\n",
        result.total_urls_discovered, result.total_urls_processed, result.total_pages_scraped
    ));

    for warning in &result.warnings {
        out.push_str(&format!("Warning: {}\n", warning));
    }
    out.push('\n');

    for scope in &result.scopes {
        let name = scope.scope_name.as_deref().unwrap_or("(unnamed)");
        out.push_str(&format!(
            "[{}] {}: {} pages, {} scraped, prefixes {:?}\n",
            scope.state.as_str(),
            name,
            scope.pages.len(),
            scope.total_pages_scraped,
            scope.allowed_prefixes,
        ));
    }

    out
}
