//! Ingestion processor
//!
//! Turns a knowledge source (web page, uploaded document, pasted text) into
//! a processed knowledge base plus its chunks. The knowledge-base update
//! and the chunk inserts are committed together by
//! [`KnowledgeStore::complete_ingestion`].

use crate::chunker::{chunk_text, ChunkingConfig};
use crate::extract::{extract_text, file_type};
use crate::fetch::{parse_url, PageFetcher};
use crate::html::clean_html;
use agentdesk_common::blob::{validate_file_name, BlobStore};
use agentdesk_common::config::IngestionConfig;
use agentdesk_common::db::models::KnowledgeBase;
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::metrics::record_ingestion;
use agentdesk_common::store::{IngestionUpdate, KnowledgeStore, NewChunk};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// Outcome reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub content_length: usize,
    pub chunks_created: usize,
}

/// Ingestion processor
pub struct IngestionProcessor {
    knowledge: Arc<dyn KnowledgeStore>,
    fetcher: Arc<dyn PageFetcher>,
    blobs: Arc<dyn BlobStore>,
    config: IngestionConfig,
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl IngestionProcessor {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        fetcher: Arc<dyn PageFetcher>,
        blobs: Arc<dyn BlobStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            knowledge,
            fetcher,
            blobs,
            config,
        }
    }

    async fn knowledge_base(&self, id: Uuid) -> Result<KnowledgeBase> {
        self.knowledge
            .find_knowledge_base(id)
            .await?
            .ok_or_else(|| AppError::KnowledgeBaseNotFound { id: id.to_string() })
    }

    /// Scrape one page into a knowledge base
    #[instrument(skip(self), fields(kb_id = %knowledge_base_id))]
    pub async fn ingest_website(
        &self,
        knowledge_base_id: Uuid,
        url: &str,
    ) -> Result<IngestionSummary> {
        let started = Instant::now();
        // An unusable URL fails the same way an unreachable one does
        let parsed = parse_url(url).map_err(|e| AppError::Fetch {
            status: None,
            message: e.to_string(),
        })?;
        self.knowledge_base(knowledge_base_id).await?;

        info!("Scraping website");
        let page = self.fetcher.fetch(&parsed).await?;
        let text = clean_html(&page.body);

        let content_length = text.chars().count();
        if content_length < self.config.min_website_chars {
            return Err(AppError::Extraction {
                message: format!(
                    "webpage yielded {} characters of text, at least {} required",
                    content_length, self.config.min_website_chars
                ),
            });
        }

        let metadata = json!({
            "scraped_at": chrono::Utc::now().to_rfc3339(),
            "content_length": content_length,
            "content_hash": content_hash(&text),
            "source_url": url,
        });

        let summary = self
            .complete(
                knowledge_base_id,
                text,
                Some(url.to_string()),
                metadata,
                json!({ "source_url": url }),
            )
            .await?;

        record_ingestion(started.elapsed().as_secs_f64(), summary.chunks_created, "website");
        info!(
            content_length = summary.content_length,
            chunks = summary.chunks_created,
            "Website scraped"
        );
        Ok(summary)
    }

    /// Extract an uploaded document into a knowledge base
    #[instrument(skip(self), fields(kb_id = %knowledge_base_id, user_id = %user_id))]
    pub async fn ingest_document(
        &self,
        knowledge_base_id: Uuid,
        user_id: Uuid,
        file_name: &str,
    ) -> Result<IngestionSummary> {
        let started = Instant::now();
        validate_file_name(file_name)?;
        self.knowledge_base(knowledge_base_id).await?;

        let bytes = self
            .blobs
            .download(user_id, file_name)
            .await?
            .ok_or_else(|| AppError::Download {
                message: "File not found".to_string(),
            })?;

        let text = extract_text(file_name, &bytes)?;
        let text = text.trim().to_string();

        let content_length = text.chars().count();
        if content_length < self.config.min_document_chars {
            return Err(AppError::Extraction {
                message: format!(
                    "file yielded {} characters of text, at least {} required",
                    content_length, self.config.min_document_chars
                ),
            });
        }

        let metadata = json!({
            "processed_at": chrono::Utc::now().to_rfc3339(),
            "content_length": content_length,
            "content_hash": content_hash(&text),
            "file_name": file_name,
            "file_type": file_type(file_name),
        });

        let summary = self
            .complete(
                knowledge_base_id,
                text,
                None,
                metadata,
                json!({ "file_name": file_name }),
            )
            .await?;

        record_ingestion(started.elapsed().as_secs_f64(), summary.chunks_created, "files");
        info!(
            content_length = summary.content_length,
            chunks = summary.chunks_created,
            "Document processed"
        );
        Ok(summary)
    }

    /// Chunk pasted text. `content` replaces the stored text when given.
    #[instrument(skip(self, content), fields(kb_id = %knowledge_base_id))]
    pub async fn ingest_text(
        &self,
        knowledge_base_id: Uuid,
        content: Option<String>,
    ) -> Result<IngestionSummary> {
        let started = Instant::now();
        let kb = self.knowledge_base(knowledge_base_id).await?;

        let text = content
            .or(kb.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Extraction {
                message: "knowledge base has no text to process".to_string(),
            })?;

        let content_length = text.chars().count();
        let metadata = json!({
            "processed_at": chrono::Utc::now().to_rfc3339(),
            "content_length": content_length,
            "content_hash": content_hash(&text),
        });

        let summary = self
            .complete(
                knowledge_base_id,
                text,
                None,
                metadata,
                json!({ "knowledge_base_id": knowledge_base_id }),
            )
            .await?;

        record_ingestion(started.elapsed().as_secs_f64(), summary.chunks_created, "text");
        Ok(summary)
    }

    /// Chunk the text and commit it with the knowledge-base update
    async fn complete(
        &self,
        knowledge_base_id: Uuid,
        text: String,
        url: Option<String>,
        metadata: serde_json::Value,
        chunk_source: serde_json::Value,
    ) -> Result<IngestionSummary> {
        let chunks: Vec<NewChunk> = chunk_text(&text, &ChunkingConfig::from(&self.config))
            .enumerate()
            .map(|(index, content)| {
                let chunk_index = storable_index(index)?;
                let mut chunk_metadata = chunk_source.clone();
                chunk_metadata["chunk_index"] = json!(index);
                Ok(NewChunk {
                    chunk_index,
                    content,
                    metadata: chunk_metadata,
                })
            })
            .collect::<Result<_>>()?;

        let content_length = text.chars().count();
        let update = IngestionUpdate {
            content: text,
            url,
            metadata,
        };

        let chunks_created = self
            .knowledge
            .complete_ingestion(knowledge_base_id, update, chunks)
            .await?;

        Ok(IngestionSummary {
            content_length,
            chunks_created,
        })
    }
}

/// Chunk positions are stored as INTEGER
fn storable_index(index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| AppError::Internal {
        message: format!("chunk index {index} exceeds the storable range"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use agentdesk_common::db::models::SourceType;
    use agentdesk_common::memory::{sample_knowledge_base, MemoryBlobStore, MemoryStore};
    use tokio_test::assert_err;

    const PAGE_URL: &str = "https://acme.test/about";

    fn long_html() -> String {
        let paragraph = "Acme builds reliable rockets for hobbyists and schools. ".repeat(4);
        format!(
            "<html><head><title>About</title><script>track()</script></head>\
             <body><p>{paragraph}</p><p>{paragraph}</p></body></html>"
        )
    }

    struct Harness {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        processor: IngestionProcessor,
        kb_id: Uuid,
    }

    fn harness(fetcher: StaticFetcher, source: SourceType) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let kb = sample_knowledge_base(Uuid::new_v4(), source);
        let kb_id = kb.id;
        store.insert_knowledge_base(kb);

        let processor = IngestionProcessor::new(
            store.clone(),
            Arc::new(fetcher),
            blobs.clone(),
            IngestionConfig::default(),
        );

        Harness {
            store,
            blobs,
            processor,
            kb_id,
        }
    }

    #[tokio::test]
    async fn test_website_ingestion() {
        let h = harness(StaticFetcher::new().html(PAGE_URL, &long_html()), SourceType::Website);

        let summary = h.processor.ingest_website(h.kb_id, PAGE_URL).await.unwrap();

        let kb = h.store.knowledge_base(h.kb_id).unwrap();
        assert!(kb.processed);
        assert_eq!(kb.url.as_deref(), Some(PAGE_URL));
        assert_eq!(kb.metadata["source_url"], PAGE_URL);
        assert_eq!(kb.metadata["content_length"], summary.content_length);
        assert!(!kb.content.unwrap().contains("track()"));

        let chunks = h.store.chunks(h.kb_id);
        assert_eq!(chunks.len(), summary.chunks_created);
        assert!(summary.chunks_created >= 1);
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
        assert_eq!(chunks[0].metadata["source_url"], PAGE_URL);
    }

    #[tokio::test]
    async fn test_website_404_leaves_kb_unprocessed() {
        let h = harness(StaticFetcher::new(), SourceType::Website);

        let err = h
            .processor
            .ingest_website(h.kb_id, "https://acme.test/gone")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to fetch website: 404 Not Found");
        let kb = h.store.knowledge_base(h.kb_id).unwrap();
        assert!(!kb.processed);
        assert!(h.store.chunks(h.kb_id).is_empty());
    }

    #[tokio::test]
    async fn test_website_without_content_is_extraction_error() {
        let fetcher = StaticFetcher::new().html(PAGE_URL, "<html><body><p>Hi</p></body></html>");
        let h = harness(fetcher, SourceType::Website);

        let err = assert_err!(h.processor.ingest_website(h.kb_id, PAGE_URL).await);
        assert!(matches!(err, AppError::Extraction { .. }));
        assert!(!h.store.knowledge_base(h.kb_id).unwrap().processed);
    }

    #[test]
    fn test_storable_index_range() {
        assert_eq!(storable_index(0).unwrap(), 0);
        assert_eq!(storable_index(i32::MAX as usize).unwrap(), i32::MAX);
        let err = storable_index(i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }

    #[tokio::test]
    async fn test_malformed_url_fails_as_fetch_error() {
        let h = harness(StaticFetcher::new(), SourceType::Website);
        let err = assert_err!(h.processor.ingest_website(h.kb_id, "acme dot test").await);
        assert!(matches!(err, AppError::Fetch { status: None, .. }));
        assert_eq!(err.status_code().as_u16(), 500);
        assert!(!h.store.knowledge_base(h.kb_id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_document_ingestion() {
        let h = harness(StaticFetcher::new(), SourceType::Files);
        let user_id = Uuid::new_v4();
        let body = "Our support desk is open from nine to five on weekdays.\n\n".repeat(3);
        h.blobs.put(user_id, "hours.txt", body.as_bytes());

        let summary = h
            .processor
            .ingest_document(h.kb_id, user_id, "hours.txt")
            .await
            .unwrap();

        assert_eq!(summary.content_length, body.trim().chars().count());
        let kb = h.store.knowledge_base(h.kb_id).unwrap();
        assert!(kb.processed);
        assert_eq!(kb.metadata["file_name"], "hours.txt");
        assert_eq!(kb.metadata["file_type"], "txt");
        assert_eq!(kb.metadata["content_hash"].as_str().map(str::len), Some(64));
        assert_eq!(h.store.chunks(h.kb_id)[0].metadata["file_name"], "hours.txt");
    }

    #[tokio::test]
    async fn test_missing_document_is_download_error() {
        let h = harness(StaticFetcher::new(), SourceType::Files);
        let err = h
            .processor
            .ingest_document(h.kb_id, Uuid::new_v4(), "absent.txt")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to download file: File not found");
    }

    #[tokio::test]
    async fn test_short_document_rejected() {
        let h = harness(StaticFetcher::new(), SourceType::Files);
        let user_id = Uuid::new_v4();
        h.blobs.put(user_id, "tiny.txt", "too short");

        let err = h
            .processor
            .ingest_document(h.kb_id, user_id, "tiny.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_reingestion_replaces_chunks() {
        let h = harness(StaticFetcher::new(), SourceType::Text);
        let first = "First version of the pasted knowledge, long enough to keep.".to_string();
        let second = "Second version of the pasted knowledge, also long enough to keep.".to_string();

        h.processor.ingest_text(h.kb_id, Some(first)).await.unwrap();
        h.processor.ingest_text(h.kb_id, Some(second.clone())).await.unwrap();

        let chunks = h.store.chunks(h.kb_id);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, second);
    }

    #[tokio::test]
    async fn test_text_ingestion_uses_stored_content() {
        let store = Arc::new(MemoryStore::new());
        let mut kb = sample_knowledge_base(Uuid::new_v4(), SourceType::Text);
        kb.content = Some("Refunds are accepted within thirty days of purchase with a receipt.".into());
        let kb_id = kb.id;
        store.insert_knowledge_base(kb);

        let processor = IngestionProcessor::new(
            store.clone(),
            Arc::new(StaticFetcher::new()),
            Arc::new(MemoryBlobStore::new()),
            IngestionConfig::default(),
        );

        let summary = processor.ingest_text(kb_id, None).await.unwrap();
        assert_eq!(summary.chunks_created, 1);
        assert!(store.knowledge_base(kb_id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_unknown_knowledge_base() {
        let h = harness(StaticFetcher::new(), SourceType::Text);
        let err = h
            .processor
            .ingest_text(Uuid::new_v4(), Some("anything".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::KnowledgeBaseNotFound { .. }));
    }
}
