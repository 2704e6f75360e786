//! Multi-page crawl handler

use crate::extract::ApiJson;
use crate::state::AppState;
use agentdesk_common::errors::Result;
use agentdesk_ingestion::{CrawlOptions, ScrapedPage};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /web-scraper`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebScraperRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    #[serde(default = "default_same_domain")]
    pub same_domain: bool,

    /// Falls back to the configured default
    #[serde(default)]
    pub max_pages: Option<usize>,
}

fn default_same_domain() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebScraperResponse {
    pub success: bool,
    pub data: Vec<ScrapedPage>,
    pub total_pages: usize,
    pub domain: String,
}

pub async fn web_scraper(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<WebScraperRequest>,
) -> Result<Json<WebScraperResponse>> {
    let options = CrawlOptions {
        same_domain: request.same_domain,
        max_pages: request
            .max_pages
            .unwrap_or(state.config.ingestion.crawl_default_max_pages),
    };

    let report = state.crawler.crawl(&request.url, options).await?;

    Ok(Json(WebScraperResponse {
        success: true,
        total_pages: report.pages.len(),
        data: report.pages,
        domain: report.domain,
    }))
}
