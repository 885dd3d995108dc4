//! robots.txt parsing
//!
//! Allow/disallow matching is delegated to the robotstxt crate; Crawl-delay
//! is not part of the de-facto standard that crate implements, so the
//! directive is parsed by hand from the raw content.

use std::time::Duration;

use robotstxt::DefaultMatcher;

/// Parsed robots.txt policy for one host
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content; empty means allow everything
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Permissive policy used when robots.txt is missing or unfetchable
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks whether `url` may be fetched by `user_agent`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay for `user_agent`, preferring a specific agent group over
    /// the wildcard group
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_group_header = false;
        let mut wildcard_delay: Option<f64> = None;
        let mut agent_delay: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // Consecutive User-agent lines form one group header.
                    if !in_group_header {
                        group_agents.clear();
                        in_group_header = true;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_group_header = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group_agents.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        agent_delay = Some(delay);
                    } else if group_agents.iter().any(|ua| ua == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
                _ => {
                    in_group_header = false;
                }
            }
        }

        agent_delay
            .or(wildcard_delay)
            .filter(|d| *d >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_permits_everything() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/private", "SeineBot"));
        assert_eq!(robots.crawl_delay("SeineBot"), None);
    }

    #[test]
    fn test_disallow_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /private");
        assert!(!robots.is_allowed("https://example.com/private/page", "SeineBot"));
        assert!(robots.is_allowed("https://example.com/public", "SeineBot"));
    }

    #[test]
    fn test_disallow_everything() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("https://example.com/", "SeineBot"));
    }

    #[test]
    fn test_wildcard_crawl_delay() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 2.5\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("SeineBot"), Some(Duration::from_secs_f64(2.5)));
    }

    #[test]
    fn test_specific_agent_delay_preferred() {
        let robots = ParsedRobots::from_content(
            "User-agent: SeineBot\nCrawl-delay: 10\n\nUser-agent: *\nCrawl-delay: 2",
        );
        assert_eq!(robots.crawl_delay("SeineBot/1.0"), Some(Duration::from_secs(10)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_grouped_user_agents() {
        let robots = ParsedRobots::from_content(
            "User-agent: ABot\nUser-agent: BBot\nCrawl-delay: 4",
        );
        assert_eq!(robots.crawl_delay("BBot"), Some(Duration::from_secs(4)));
        assert_eq!(robots.crawl_delay("CBot"), None);
    }

    #[test]
    fn test_unparseable_delay_ignored() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon");
        assert_eq!(robots.crawl_delay("SeineBot"), None);
    }

    #[test]
    fn test_comments_stripped() {
        let robots =
            ParsedRobots::from_content("User-agent: * # everyone\nCrawl-delay: 1 # one second");
        assert_eq!(robots.crawl_delay("SeineBot"), Some(Duration::from_secs(1)));
    }
}
