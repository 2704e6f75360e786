//! Knowledge-base ingestion handlers
//!
//! Each call runs the whole ingestion before answering; the dashboard
//! fires them without waiting on the result.

use crate::extract::ApiJson;
use crate::state::AppState;
use agentdesk_common::errors::Result;
use agentdesk_ingestion::IngestionSummary;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Successful ingestion response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub summary: IngestionSummary,
}

impl IngestResponse {
    fn ok(message: &str, summary: IngestionSummary) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
            summary,
        })
    }
}

/// Body of `POST /scrape-website`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeWebsiteRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    pub knowledge_base_id: Uuid,
}

/// Body of `POST /process-document`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    pub knowledge_base_id: Uuid,
    pub user_id: Uuid,
}

/// Body of `POST /process-text`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessTextRequest {
    pub knowledge_base_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
}

pub async fn scrape_website(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ScrapeWebsiteRequest>,
) -> Result<Json<IngestResponse>> {
    let summary = state
        .ingestion
        .ingest_website(request.knowledge_base_id, &request.url)
        .await?;

    Ok(IngestResponse::ok("Website scraped successfully", summary))
}

pub async fn process_document(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProcessDocumentRequest>,
) -> Result<Json<IngestResponse>> {
    let summary = state
        .ingestion
        .ingest_document(request.knowledge_base_id, request.user_id, &request.file_name)
        .await?;

    Ok(IngestResponse::ok("Document processed successfully", summary))
}

pub async fn process_text(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProcessTextRequest>,
) -> Result<Json<IngestResponse>> {
    let summary = state
        .ingestion
        .ingest_text(request.knowledge_base_id, request.content)
        .await?;

    Ok(IngestResponse::ok("Text processed successfully", summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let Json(response) = IngestResponse::ok(
            "Website scraped successfully",
            IngestionSummary {
                content_length: 1200,
                chunks_created: 2,
            },
        );
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["contentLength"], 1200);
        assert_eq!(json["chunksCreated"], 2);
    }
}
