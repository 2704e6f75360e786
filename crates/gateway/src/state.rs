//! Shared handler state

use agentdesk_chat::{ChatModel, ChatOrchestrator, ConversationService, LexicalRetriever};
use agentdesk_common::{
    AgentStore, AnalyticsSink, AppConfig, BlobStore, ConversationStore, DbPool, KnowledgeStore,
};
use agentdesk_ingestion::{Crawler, IngestionProcessor, PageFetcher};
use std::sync::Arc;

/// Adapters the pipelines are built from
pub struct Services {
    pub agents: Arc<dyn AgentStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub blobs: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub model: Arc<dyn ChatModel>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent when running without a database (tests)
    pub db: Option<DbPool>,
    pub chat: Arc<ChatOrchestrator>,
    pub ingestion: Arc<IngestionProcessor>,
    pub crawler: Arc<Crawler>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: Option<DbPool>, services: Services) -> Self {
        let retriever = LexicalRetriever::new(services.knowledge.clone(), &config.retrieval);

        let chat = ChatOrchestrator::new(
            services.agents,
            ConversationService::new(services.conversations, config.retrieval.history_limit),
            Arc::new(retriever),
            services.model,
            services.analytics,
            config.llm.clone(),
        );

        let ingestion = IngestionProcessor::new(
            services.knowledge,
            services.fetcher.clone(),
            services.blobs,
            config.ingestion.clone(),
        );

        let crawler = Crawler::new(services.fetcher, &config.ingestion);

        Self {
            config,
            db,
            chat: Arc::new(chat),
            ingestion: Arc::new(ingestion),
            crawler: Arc::new(crawler),
        }
    }
}
