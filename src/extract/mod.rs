//! HTML content extraction
//!
//! Given a fetched page and its final URL, produces the title, main text,
//! heading list, and the ordered set of discovered anchors. Extraction
//! failures are scrape-phase failures on the page row, never errors.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::{ElementRef, Html, Node, Selector};
use ::url::Url;

use crate::config::Limits;
use crate::crawler::{FailureInfo, FailurePhase, FailureType};
use crate::url::canonicalize;

/// Pages with less extracted text than this are considered empty
const MIN_CONTENT_LENGTH: usize = 50;

/// Elements whose subtrees never contribute to main text
const EXCLUDED_ELEMENTS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "form",
];

/// Marker appended when content is cut at the length limit
const TRUNCATION_MARKER: &str = "...[truncated]";

/// Everything extracted from one page
#[derive(Debug, Default)]
pub struct Extracted {
    pub title: Option<String>,
    pub content: Option<String>,
    pub headings: Vec<String>,
    /// Canonical absolute anchors in document order, first occurrence kept
    pub anchors: Vec<Url>,
    /// Valid anchor occurrences before deduplication
    pub links_found: usize,
    /// Scrape-phase failure, when extraction came up short
    pub failure: Option<FailureInfo>,
}

/// HTML extractor shared by a job's workers
pub struct Extractor {
    limits: Arc<Limits>,
}

impl Extractor {
    pub fn new(limits: Arc<Limits>) -> Self {
        Self { limits }
    }

    /// Extracts anchors and, when `want_content` is set, title / headings /
    /// main text from `html`
    ///
    /// Anchors are always extracted so crawl-only modes can expand the
    /// frontier. `final_url` is the base for resolving relative hrefs.
    pub fn extract(&self, html: &str, final_url: &Url, want_content: bool) -> Extracted {
        if html.trim().is_empty() {
            return Extracted {
                failure: Some(scrape_failure(
                    FailureType::ParseError,
                    "empty document body",
                )),
                ..Extracted::default()
            };
        }

        let document = Html::parse_document(html);
        let (anchors, links_found) = extract_anchors(&document, final_url);

        if !want_content {
            return Extracted {
                anchors,
                links_found,
                ..Extracted::default()
            };
        }

        let title = extract_title(&document);
        let headings = extract_headings(&document, self.limits.max_headings);

        let Some(root) = content_root(&document) else {
            return Extracted {
                title,
                headings,
                anchors,
                links_found,
                failure: Some(scrape_failure(
                    FailureType::SelectorMismatch,
                    "no content root element",
                )),
                ..Extracted::default()
            };
        };

        let content = collect_content(root, self.limits.max_content_length);
        let failure = if content.trim().len() < MIN_CONTENT_LENGTH {
            Some(scrape_failure(
                FailureType::EmptyContent,
                "page returned empty or minimal content",
            ))
        } else {
            None
        };

        Extracted {
            title,
            content: Some(content),
            headings,
            anchors,
            links_found,
            failure,
        }
    }
}

fn scrape_failure(failure_type: FailureType, reason: &str) -> FailureInfo {
    FailureInfo {
        phase: FailurePhase::Scrape,
        failure_type,
        reason: Some(reason.to_string()),
        http_status: None,
    }
}

/// First non-empty of `<title>`, `<h1>`, `og:title`
fn extract_title(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("title") {
        if let Some(title) = first_text(document, &selector) {
            return Some(title);
        }
    }
    if let Ok(selector) = Selector::parse("h1") {
        if let Some(title) = first_text(document, &selector) {
            return Some(title);
        }
    }
    if let Ok(selector) = Selector::parse(r#"meta[property="og:title"]"#) {
        if let Some(element) = document.select(&selector).next() {
            let content = element.value().attr("content").unwrap_or("").trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    None
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Headings in document order, `H2: text` style, truncated to `max`
fn extract_headings(document: &Html, max: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let text = el.text().collect::<String>().trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(format!("{}: {}", el.value().name().to_uppercase(), text))
            }
        })
        .take(max)
        .collect()
}

/// Preferred root for main text: `<main>`, then `<article>`, then `<body>`
fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    for raw in ["main", "article", "body"] {
        if let Ok(selector) = Selector::parse(raw) {
            if let Some(element) = document.select(&selector).next() {
                return Some(element);
            }
        }
    }
    None
}

/// Collects whitespace-collapsed text under `root`, skipping excluded
/// subtrees, truncated to `max_len` characters
fn collect_content(root: ElementRef<'_>, max_len: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    collect_text(root, &mut lines);
    let content = lines.join("\n");

    if content.chars().count() > max_len {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}{}", truncated, TRUNCATION_MARKER)
    } else {
        content
    }
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    out.push(collapsed);
                }
            }
            Node::Element(el) => {
                if EXCLUDED_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                }
            }
            _ => {}
        }
    }
}

/// `a[href]` anchors resolved against the final URL and canonicalized
///
/// Returns the deduped list (first occurrence kept, document order) plus
/// the raw count of valid occurrences, which is what page rows report as
/// `links_found`.
fn extract_anchors(document: &Html, base: &Url) -> (Vec<Url>, usize) {
    let Ok(selector) = Selector::parse("a[href]") else {
        return (Vec::new(), 0);
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut anchors: Vec<Url> = Vec::new();
    let mut links_found = 0usize;

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = canonicalize(href, Some(base)) else {
            continue;
        };
        links_found += 1;
        if seen.insert(url.to_string()) {
            anchors.push(url);
        }
    }

    (anchors, links_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new(Arc::new(Limits::default()))
    }

    fn base() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    const FULL_PAGE: &str = r#"
        <html>
          <head>
            <title>The Title</title>
            <meta property="og:title" content="OG Title" />
          </head>
          <body>
            <nav><a href="/nav-link">Nav</a>Navigation chrome text</nav>
            <main>
              <h1>Main Heading</h1>
              <p>This is the primary body text of the page, long enough to
                 count as real content for extraction purposes.</p>
              <a href="/child-a">A</a>
              <a href="/child-b">B</a>
              <a href="/child-a">A again</a>
            </main>
            <script>var ignored = true;</script>
            <footer>Footer text</footer>
          </body>
        </html>
    "#;

    #[test]
    fn test_title_from_title_tag() {
        let extracted = extractor().extract(FULL_PAGE, &base(), true);
        assert_eq!(extracted.title, Some("The Title".to_string()));
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let html = "<html><body><h1>Fallback</h1><p>text</p></body></html>";
        let extracted = extractor().extract(html, &base(), true);
        assert_eq!(extracted.title, Some("Fallback".to_string()));
    }

    #[test]
    fn test_title_falls_back_to_og_title() {
        let html = r#"<html><head><meta property="og:title" content="OG" /></head><body><p>x</p></body></html>"#;
        let extracted = extractor().extract(html, &base(), true);
        assert_eq!(extracted.title, Some("OG".to_string()));
    }

    #[test]
    fn test_content_skips_chrome_and_scripts() {
        let extracted = extractor().extract(FULL_PAGE, &base(), true);
        let content = extracted.content.unwrap();
        assert!(content.contains("primary body text"));
        assert!(!content.contains("ignored"));
        assert!(!content.contains("Navigation chrome"));
        assert!(!content.contains("Footer text"));
    }

    #[test]
    fn test_headings_in_order_with_tags() {
        let html = "<html><body><h1>One</h1><p>x</p><h2>Two</h2><h3>Three</h3></body></html>";
        let extracted = extractor().extract(html, &base(), true);
        assert_eq!(extracted.headings, vec!["H1: One", "H2: Two", "H3: Three"]);
    }

    #[test]
    fn test_headings_capped() {
        let mut html = String::from("<html><body>");
        for i in 0..60 {
            html.push_str(&format!("<h2>Heading {}</h2>", i));
        }
        html.push_str("</body></html>");
        let extracted = extractor().extract(&html, &base(), true);
        assert_eq!(extracted.headings.len(), 50);
    }

    #[test]
    fn test_anchors_resolved_and_deduped() {
        let extracted = extractor().extract(FULL_PAGE, &base(), true);
        let anchors: Vec<String> = extracted.anchors.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            anchors,
            vec![
                "https://example.com/nav-link",
                "https://example.com/child-a",
                "https://example.com/child-b",
            ]
        );
        // links_found counts occurrences, including the duplicate child-a.
        assert_eq!(extracted.links_found, 4);
    }

    #[test]
    fn test_anchors_skip_traps_and_downloads() {
        let html = r##"
            <html><body>
              <a href="javascript:void(0)">js</a>
              <a href="mailto:x@y.z">mail</a>
              <a href="#frag">frag</a>
              <a href="/file.pdf" download>dl</a>
              <a href="/ok">ok</a>
            </body></html>
        "##;
        let extracted = extractor().extract(html, &base(), true);
        let anchors: Vec<String> = extracted.anchors.iter().map(|u| u.to_string()).collect();
        assert_eq!(anchors, vec!["https://example.com/ok"]);
    }

    #[test]
    fn test_crawl_only_extracts_anchors_only() {
        let extracted = extractor().extract(FULL_PAGE, &base(), false);
        assert!(extracted.title.is_none());
        assert!(extracted.content.is_none());
        assert!(extracted.headings.is_empty());
        assert_eq!(extracted.anchors.len(), 3);
        assert!(extracted.failure.is_none());
    }

    #[test]
    fn test_empty_document_is_parse_error() {
        let extracted = extractor().extract("   ", &base(), true);
        let failure = extracted.failure.unwrap();
        assert_eq!(failure.phase, FailurePhase::Scrape);
        assert_eq!(failure.failure_type, FailureType::ParseError);
    }

    #[test]
    fn test_minimal_content_is_empty_content_failure() {
        let html = "<html><body><p>tiny</p></body></html>";
        let extracted = extractor().extract(html, &base(), true);
        let failure = extracted.failure.unwrap();
        assert_eq!(failure.failure_type, FailureType::EmptyContent);
    }

    #[test]
    fn test_content_truncation() {
        let limits = Limits {
            max_content_length: 100,
            ..Limits::default()
        };
        let extractor = Extractor::new(Arc::new(limits));
        let body = "word ".repeat(200);
        let html = format!("<html><body><p>{}</p></body></html>", body);
        let extracted = extractor.extract(&html, &base(), true);
        let content = extracted.content.unwrap();
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert!(content.chars().count() <= 100 + TRUNCATION_MARKER.len());
    }
}
