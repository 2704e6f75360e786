//! In-memory implementations of the storage ports
//!
//! Compiled with the `test-util` feature so the pipeline crates can drive
//! their tests without a database.

use crate::blob::{validate_file_name, BlobStore};
use crate::db::models::*;
use crate::errors::{AppError, Result};
use crate::store::{
    AgentStore, AnalyticsSink, ConversationStore, IngestionUpdate, KnowledgeStore, NewChunk,
    NewConversation,
};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

fn now() -> DateTimeWithTimeZone {
    chrono::Utc::now().fixed_offset()
}

/// An active agent with no model overrides
pub fn sample_agent(user_id: Uuid) -> Agent {
    Agent {
        id: Uuid::new_v4(),
        user_id,
        name: "Support Bot".to_string(),
        description: None,
        instructions: Some("You answer questions about Acme products.".to_string()),
        model: None,
        temperature: None,
        max_tokens: None,
        is_active: true,
        created_at: now(),
        updated_at: now(),
    }
}

/// An unprocessed knowledge base
pub fn sample_knowledge_base(agent_id: Uuid, source: SourceType) -> KnowledgeBase {
    KnowledgeBase {
        id: Uuid::new_v4(),
        agent_id,
        name: "Knowledge".to_string(),
        source_type: String::from(source),
        content: None,
        url: None,
        processed: false,
        metadata: serde_json::json!({}),
        created_at: now(),
        updated_at: now(),
    }
}

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    agents: HashMap<Uuid, Agent>,
    knowledge_bases: Vec<KnowledgeBase>,
    chunks: Vec<Chunk>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    analytics: Vec<AnalyticsEvent>,
}

/// Storage ports backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_analytics: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every analytics write fail
    pub fn fail_analytics(&self, fail: bool) {
        self.fail_analytics.store(fail, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn insert_profile(&self, user_id: Uuid, api_key: Option<&str>) -> Profile {
        let profile = Profile {
            id: user_id,
            email: None,
            openai_api_key: api_key.map(str::to_string),
            updated_at: now(),
        };
        self.state().profiles.insert(user_id, profile.clone());
        profile
    }

    pub fn insert_agent(&self, agent: Agent) {
        self.state().agents.insert(agent.id, agent);
    }

    pub fn insert_knowledge_base(&self, kb: KnowledgeBase) {
        self.state().knowledge_bases.push(kb);
    }

    pub fn insert_chunk(&self, knowledge_base_id: Uuid, chunk_index: i32, content: &str) {
        self.state().chunks.push(Chunk {
            id: Uuid::new_v4(),
            knowledge_base_id,
            chunk_index,
            content: content.to_string(),
            metadata: serde_json::json!({ "chunk_index": chunk_index }),
            created_at: now(),
        });
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn knowledge_base(&self, id: Uuid) -> Option<KnowledgeBase> {
        self.state().knowledge_bases.iter().find(|kb| kb.id == id).cloned()
    }

    /// Chunks of a knowledge base in index order
    pub fn chunks(&self, knowledge_base_id: Uuid) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self
            .state()
            .chunks
            .iter()
            .filter(|c| c.knowledge_base_id == knowledge_base_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    /// Messages of a conversation in creation order
    pub fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn analytics_events(&self) -> Vec<AnalyticsEvent> {
        self.state().analytics.clone()
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_active_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        Ok(self.state().agents.get(&id).filter(|a| a.is_active).cloned())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.state().profiles.get(&user_id).cloned())
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn find_knowledge_base(&self, id: Uuid) -> Result<Option<KnowledgeBase>> {
        Ok(self.knowledge_base(id))
    }

    async fn processed_knowledge_bases(&self, agent_id: Uuid) -> Result<Vec<KnowledgeBase>> {
        Ok(self
            .state()
            .knowledge_bases
            .iter()
            .filter(|kb| kb.agent_id == agent_id && kb.processed)
            .cloned()
            .collect())
    }

    async fn list_chunks(&self, knowledge_base_ids: &[Uuid], limit: u64) -> Result<Vec<Chunk>> {
        Ok(self
            .state()
            .chunks
            .iter()
            .filter(|c| knowledge_base_ids.contains(&c.knowledge_base_id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn complete_ingestion(
        &self,
        knowledge_base_id: Uuid,
        update: IngestionUpdate,
        chunks: Vec<NewChunk>,
    ) -> Result<usize> {
        let mut state = self.state();

        let kb = state
            .knowledge_bases
            .iter_mut()
            .find(|kb| kb.id == knowledge_base_id)
            .ok_or_else(|| AppError::KnowledgeBaseNotFound {
                id: knowledge_base_id.to_string(),
            })?;

        kb.content = Some(update.content);
        if update.url.is_some() {
            kb.url = update.url;
        }
        kb.processed = true;
        kb.metadata = update.metadata;
        kb.updated_at = now();

        state.chunks.retain(|c| c.knowledge_base_id != knowledge_base_id);

        let count = chunks.len();
        state.chunks.extend(chunks.into_iter().map(|chunk| Chunk {
            id: Uuid::new_v4(),
            knowledge_base_id,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
            metadata: chunk.metadata,
            created_at: now(),
        }));

        Ok(count)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            agent_id: new.agent_id,
            visitor_id: new.visitor_id,
            visitor_name: new.visitor_name,
            visitor_email: new.visitor_email,
            status: "active".to_string(),
            created_at: now(),
        };
        self.state().conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.state().conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::now_v7(),
            conversation_id,
            message_type: String::from(kind),
            content: content.to_string(),
            created_at: now(),
        };
        self.state().messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>> {
        Ok(self
            .state()
            .messages
            .iter()
            .rev()
            .filter(|m| m.conversation_id == conversation_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsSink for MemoryStore {
    async fn record(
        &self,
        agent_id: Uuid,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<()> {
        if self.fail_analytics.load(Ordering::SeqCst) {
            return Err(AppError::storage_write("analytics event", "analytics table unavailable"));
        }

        self.state().analytics.push(AnalyticsEvent {
            id: Uuid::new_v4(),
            agent_id,
            event_type: event_type.to_string(),
            event_data,
            created_at: now(),
        });
        Ok(())
    }
}

/// Blob store holding files in a map keyed by (user, file name)
#[derive(Default)]
pub struct MemoryBlobStore {
    files: Mutex<HashMap<(Uuid, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, user_id: Uuid, file_name: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((user_id, file_name.to_string()), bytes.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, user_id: Uuid, file_name: &str) -> Result<Option<Vec<u8>>> {
        validate_file_name(file_name)?;
        Ok(self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id, file_name.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_complete_ingestion_replaces_chunks() {
        let store = MemoryStore::new();
        let kb = sample_knowledge_base(Uuid::new_v4(), SourceType::Text);
        let kb_id = kb.id;
        store.insert_knowledge_base(kb);
        store.insert_chunk(kb_id, 0, "stale passage");

        let update = IngestionUpdate {
            content: "fresh".into(),
            url: None,
            metadata: serde_json::json!({ "content_length": 5 }),
        };
        let chunk = NewChunk {
            chunk_index: 0,
            content: "fresh passage".into(),
            metadata: serde_json::json!({}),
        };
        let written = assert_ok!(store.complete_ingestion(kb_id, update, vec![chunk]).await);

        assert_eq!(written, 1);
        let chunks = store.chunks(kb_id);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "fresh passage");
        assert!(store.knowledge_base(kb_id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_recent_messages_newest_first() {
        let store = MemoryStore::new();
        let conversation_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append_message(conversation_id, MessageKind::User, &format!("m{i}"))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(conversation_id, 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3"]);
    }

    #[tokio::test]
    async fn test_inactive_agent_hidden() {
        let store = MemoryStore::new();
        let mut agent = sample_agent(Uuid::new_v4());
        agent.is_active = false;
        let id = agent.id;
        store.insert_agent(agent);

        assert!(store.find_active_agent(id).await.unwrap().is_none());
    }
}
