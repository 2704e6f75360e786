//! Storage ports
//!
//! The pipeline crates depend on these traits rather than on a concrete
//! database. [`crate::db::Repository`] implements them against Postgres;
//! `MemoryStore` (feature `test-util`) implements them in memory.

use crate::db::models::{Agent, Chunk, Conversation, KnowledgeBase, Message, MessageKind, Profile};
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Fields for a conversation created on first message
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub agent_id: Uuid,
    pub visitor_id: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
}

/// A passage produced by the chunker, ready to insert
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Knowledge-base fields written when an ingestion completes
#[derive(Debug, Clone)]
pub struct IngestionUpdate {
    pub content: String,
    pub url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Agent and owner lookups
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Find an agent by id, only if it is active
    async fn find_active_agent(&self, id: Uuid) -> Result<Option<Agent>>;

    /// Find the profile holding a user's model credential
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
}

/// Knowledge bases and their chunks
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn find_knowledge_base(&self, id: Uuid) -> Result<Option<KnowledgeBase>>;

    /// Knowledge bases of an agent with `processed = true`
    async fn processed_knowledge_bases(&self, agent_id: Uuid) -> Result<Vec<KnowledgeBase>>;

    /// Up to `limit` chunks belonging to any of the given knowledge bases
    async fn list_chunks(&self, knowledge_base_ids: &[Uuid], limit: u64) -> Result<Vec<Chunk>>;

    /// Mark a knowledge base processed and replace its chunks atomically.
    ///
    /// Returns the number of chunks written.
    async fn complete_ingestion(
        &self,
        knowledge_base_id: Uuid,
        update: IngestionUpdate,
        chunks: Vec<NewChunk>,
    ) -> Result<usize>;
}

/// Append-only conversation log
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn append_message(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message>;

    /// The newest `limit` messages, newest first
    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(
        &self,
        agent_id: Uuid,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<()>;
}
