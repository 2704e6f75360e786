//! Page fetching
//!
//! [`PageFetcher`] is the seam between the ingestion pipeline and the
//! network. [`HttpFetcher`] is the reqwest implementation; non-success
//! statuses come back as [`AppError::Fetch`] carrying the status so the
//! retry policy can tell 404 from 503.

use agentdesk_common::config::IngestionConfig;
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::resilience::RetryPolicy;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use tracing::{debug, instrument};

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage>;
}

/// Parse an absolute http(s) URL
pub fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|_| AppError::InvalidUrl {
        url: raw.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(AppError::InvalidUrl {
            url: raw.to_string(),
        }),
    }
}

/// "404 Not Found"
fn status_line(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// reqwest-backed fetcher sending a descriptive User-Agent
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &IngestionConfig, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            retry,
        })
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| AppError::Fetch {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                status: Some(status.as_u16()),
                message: status_line(status),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| AppError::Fetch {
            status: None,
            message: e.to_string(),
        })?;

        debug!(url = %final_url, bytes = body.len(), "Page fetched");

        Ok(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        self.retry.run("page_fetch", || self.fetch_once(url)).await
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use self::fixtures::StaticFetcher;

#[cfg(any(test, feature = "test-util"))]
mod fixtures {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};

    /// Serves canned pages; unknown URLs answer 404
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: HashMap<String, (u16, String, String)>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn html(mut self, url: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (200, "text/html; charset=utf-8".into(), body.into()));
            self
        }

        pub fn page(mut self, url: &str, status: u16, content_type: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (status, content_type.into(), body.into()));
            self
        }

        /// URLs requested so far, in order
        pub fn requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(url.to_string());

            let (status, content_type, body) = self
                .pages
                .get(url.as_str())
                .cloned()
                .unwrap_or((404, "text/html".into(), String::new()));

            let status = reqwest::StatusCode::from_u16(status)
                .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            if !status.is_success() {
                return Err(AppError::Fetch {
                    status: Some(status.as_u16()),
                    message: status_line(status),
                });
            }

            Ok(FetchedPage {
                url: url.clone(),
                content_type: Some(content_type),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://acme.test/docs").is_ok());
        assert!(matches!(parse_url("not a url"), Err(AppError::InvalidUrl { .. })));
        assert!(matches!(parse_url("ftp://acme.test/file"), Err(AppError::InvalidUrl { .. })));
        assert!(matches!(parse_url("/relative/path"), Err(AppError::InvalidUrl { .. })));
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(reqwest::StatusCode::NOT_FOUND), "404 Not Found");
    }

    #[tokio::test]
    async fn test_static_fetcher_404() {
        let fetcher = StaticFetcher::new();
        let url = parse_url("https://acme.test/missing").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch website: 404 Not Found");
    }

    #[test]
    fn test_is_html() {
        let page = FetchedPage {
            url: parse_url("https://acme.test/").unwrap(),
            content_type: Some("Text/HTML; charset=utf-8".into()),
            body: String::new(),
        };
        assert!(page.is_html());
    }
}
