//! Multi-page crawler
//!
//! Breadth-first from a seed URL, following links on the seed's host only.
//! Failed fetches and non-HTML responses are skipped, not fatal. Pages are
//! spaced by a fixed delay.

use crate::fetch::{parse_url, PageFetcher};
use crate::html::{clean_html, extract_links, extract_title};
use agentdesk_common::config::IngestionConfig;
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::metrics::record_crawl;
use reqwest::Url;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One crawled page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    /// Cleaned text, truncated
    pub content: String,
    pub word_count: usize,
    /// Links first discovered on this page, capped
    pub links: Vec<String>,
    pub scraped_at: String,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub same_domain: bool,
    pub max_pages: usize,
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub pages: Vec<ScrapedPage>,
    /// Host name of the seed URL
    pub domain: String,
}

pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    page_limit: usize,
    content_chars: usize,
    links_per_page: usize,
    delay: Duration,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &IngestionConfig) -> Self {
        Self {
            fetcher,
            page_limit: config.crawl_page_limit.max(1),
            content_chars: config.crawl_content_chars,
            links_per_page: config.crawl_links_per_page,
            delay: config.crawl_delay(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[instrument(skip(self), fields(same_domain = options.same_domain, max_pages = options.max_pages))]
    pub async fn crawl(&self, seed: &str, options: CrawlOptions) -> Result<CrawlReport> {
        let mut seed = parse_url(seed)?;
        seed.set_fragment(None);
        let domain = seed
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidUrl {
                url: seed.to_string(),
            })?;
        let max_pages = options.max_pages.clamp(1, self.page_limit);

        info!(%seed, max_pages, "Starting crawl");

        let mut queue: VecDeque<Url> = VecDeque::from([seed.clone()]);
        let mut seen: HashSet<String> = HashSet::from([seed.to_string()]);
        let mut pages: Vec<ScrapedPage> = Vec::new();
        let mut fetched_any = false;

        while pages.len() < max_pages {
            let Some(url) = queue.pop_front() else {
                break;
            };

            if fetched_any && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            fetched_any = true;

            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(%url, error = %e, "Failed to fetch page, skipping");
                    continue;
                }
            };

            if !page.is_html() {
                debug!(%url, content_type = ?page.content_type, "Skipping non-HTML content");
                continue;
            }

            let text = clean_html(&page.body);
            let mut links = Vec::new();

            if options.same_domain {
                for href in extract_links(&page.body) {
                    let Ok(mut link) = url.join(href) else {
                        continue;
                    };
                    link.set_fragment(None);

                    let same_host = link.host_str() == Some(domain.as_str());
                    let web = matches!(link.scheme(), "http" | "https");
                    if same_host && web && seen.insert(link.to_string()) {
                        links.push(link.to_string());
                        queue.push_back(link);
                    }
                }
            }

            debug!(%url, chars = text.len(), discovered = links.len(), "Page scraped");

            links.truncate(self.links_per_page);
            pages.push(ScrapedPage {
                url: url.to_string(),
                title: extract_title(&page.body).unwrap_or_default(),
                word_count: text.split_whitespace().count(),
                content: text.chars().take(self.content_chars).collect(),
                links,
                scraped_at: chrono::Utc::now().to_rfc3339(),
            });
        }

        record_crawl(pages.len());
        info!(total_pages = pages.len(), "Crawl completed");

        Ok(CrawlReport { pages, domain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    fn crawler(fetcher: StaticFetcher) -> Crawler {
        Crawler::new(Arc::new(fetcher), &IngestionConfig::default()).with_delay(Duration::ZERO)
    }

    fn options(same_domain: bool, max_pages: usize) -> CrawlOptions {
        CrawlOptions {
            same_domain,
            max_pages,
        }
    }

    /// Six pages, each linking to every other page plus one external site
    fn site() -> StaticFetcher {
        let paths = ["", "a", "b", "c", "d", "e"];
        let mut fetcher = StaticFetcher::new();
        for path in paths {
            let anchors: String = paths
                .iter()
                .map(|p| format!("<a href=\"/{p}\">{p}</a>"))
                .collect();
            let body = format!(
                "<html><head><title>Page {path}</title></head><body>\
                 <p>Content of page {path}.</p>{anchors}\
                 <a href=\"https://elsewhere.test/x\">out</a></body></html>"
            );
            fetcher = fetcher.html(&format!("https://acme.test/{path}"), &body);
        }
        fetcher
    }

    #[tokio::test]
    async fn test_crawl_respects_max_pages_and_domain() {
        let report = crawler(site())
            .crawl("https://acme.test/", options(true, 3))
            .await
            .unwrap();

        assert_eq!(report.domain, "acme.test");
        assert_eq!(report.pages.len(), 3);
        for page in &report.pages {
            assert_eq!(parse_url(&page.url).unwrap().host_str(), Some("acme.test"));
        }
        assert_eq!(report.pages[0].title, "Page");
        assert_eq!(report.pages[1].url, "https://acme.test/a");
    }

    #[tokio::test]
    async fn test_links_are_new_same_host_only() {
        let report = crawler(site())
            .crawl("https://acme.test/", options(true, 2))
            .await
            .unwrap();

        let seed_links = &report.pages[0].links;
        assert_eq!(seed_links.len(), 5);
        assert!(seed_links.iter().all(|l| l.starts_with("https://acme.test/")));
        // Everything was already discovered from the seed
        assert!(report.pages[1].links.is_empty());
    }

    #[tokio::test]
    async fn test_seed_fragment_not_crawled_twice() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .html("https://acme.test/", r#"<a href="/">home</a><a href="/a">a</a>"#)
                .html("https://acme.test/a", "<p>page a</p>"),
        );
        let report = Crawler::new(fetcher.clone(), &IngestionConfig::default())
            .with_delay(Duration::ZERO)
            .crawl("https://acme.test/#top", options(true, 5))
            .await
            .unwrap();

        let urls: Vec<_> = report.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://acme.test/", "https://acme.test/a"]);
        assert_eq!(report.pages[0].links, vec!["https://acme.test/a".to_string()]);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_same_domain_false_fetches_seed_only() {
        let fetcher = Arc::new(site());
        let report = Crawler::new(fetcher.clone(), &IngestionConfig::default())
            .with_delay(Duration::ZERO)
            .crawl("https://acme.test/", options(false, 10))
            .await
            .unwrap();

        assert_eq!(report.pages.len(), 1);
        assert!(report.pages[0].links.is_empty());
        assert_eq!(fetcher.requests(), vec!["https://acme.test/".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_and_non_html_pages_skipped() {
        let fetcher = StaticFetcher::new()
            .html(
                "https://acme.test/",
                r#"<a href="/missing">m</a><a href="/data.json">j</a><a href="/ok">ok</a>"#,
            )
            .page("https://acme.test/data.json", 200, "application/json", "{}")
            .html("https://acme.test/ok", "<p>fine</p>");

        let report = crawler(fetcher)
            .crawl("https://acme.test/", options(true, 10))
            .await
            .unwrap();

        let urls: Vec<_> = report.pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://acme.test/", "https://acme.test/ok"]);
    }

    #[tokio::test]
    async fn test_content_and_links_capped() {
        let anchors: String = (0..25).map(|i| format!("<a href=\"/p{i}\">x</a>")).collect();
        let body = format!("<p>{}</p>{}", "word ".repeat(3000), anchors);
        let fetcher = StaticFetcher::new().html("https://acme.test/", &body);

        let report = crawler(fetcher)
            .crawl("https://acme.test/", options(true, 1))
            .await
            .unwrap();

        let page = &report.pages[0];
        assert_eq!(page.content.chars().count(), 8000);
        assert_eq!(page.word_count, 3000 + 25);
        assert_eq!(page.links.len(), 10);
    }

    #[tokio::test]
    async fn test_malformed_seed() {
        let err = crawler(StaticFetcher::new())
            .crawl("not a url", options(true, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_zero_max_pages_clamped_to_one() {
        let report = crawler(site())
            .crawl("https://acme.test/", options(true, 0))
            .await
            .unwrap();
        assert_eq!(report.pages.len(), 1);
    }

    #[test]
    fn test_scraped_page_serializes_camel_case() {
        let page = ScrapedPage {
            url: "https://acme.test/".into(),
            title: "Home".into(),
            content: "hello".into(),
            word_count: 1,
            links: vec![],
            scraped_at: "2025-01-01T00:00:00+00:00".into(),
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["wordCount"], 1);
        assert_eq!(json["scrapedAt"], "2025-01-01T00:00:00+00:00");
    }
}
