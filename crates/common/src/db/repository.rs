//! Repository pattern for database operations
//!
//! Implements the storage ports on top of SeaORM with transactional
//! ingestion writes.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::store::{
    AgentStore, AnalyticsSink, ConversationStore, IngestionUpdate, KnowledgeStore,
    NewChunk, NewConversation,
};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

// ============================================================================
// Agent Operations
// ============================================================================

#[async_trait]
impl AgentStore for Repository {
    async fn find_active_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        AgentEntity::find_by_id(id)
            .filter(AgentColumn::IsActive.eq(true))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        ProfileEntity::find_by_id(user_id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

// ============================================================================
// Knowledge Base Operations
// ============================================================================

#[async_trait]
impl KnowledgeStore for Repository {
    async fn find_knowledge_base(&self, id: Uuid) -> Result<Option<KnowledgeBase>> {
        KnowledgeBaseEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn processed_knowledge_bases(&self, agent_id: Uuid) -> Result<Vec<KnowledgeBase>> {
        KnowledgeBaseEntity::find()
            .filter(KnowledgeBaseColumn::AgentId.eq(agent_id))
            .filter(KnowledgeBaseColumn::Processed.eq(true))
            .order_by_asc(KnowledgeBaseColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_chunks(&self, knowledge_base_ids: &[Uuid], limit: u64) -> Result<Vec<Chunk>> {
        if knowledge_base_ids.is_empty() {
            return Ok(Vec::new());
        }

        ChunkEntity::find()
            .filter(ChunkColumn::KnowledgeBaseId.is_in(knowledge_base_ids.iter().copied()))
            .order_by_asc(ChunkColumn::CreatedAt)
            .order_by_asc(ChunkColumn::ChunkIndex)
            .limit(limit)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn complete_ingestion(
        &self,
        knowledge_base_id: Uuid,
        update: IngestionUpdate,
        chunks: Vec<NewChunk>,
    ) -> Result<usize> {
        let now = chrono::Utc::now();
        let txn = self
            .write_conn()
            .begin()
            .await
            .map_err(|e| AppError::storage_write("knowledge base", e))?;

        let mut kb: KnowledgeBaseActiveModel = KnowledgeBaseEntity::find_by_id(knowledge_base_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::KnowledgeBaseNotFound {
                id: knowledge_base_id.to_string(),
            })?
            .into();

        kb.content = Set(Some(update.content));
        if update.url.is_some() {
            kb.url = Set(update.url);
        }
        kb.processed = Set(true);
        kb.metadata = Set(update.metadata);
        kb.updated_at = Set(now.into());

        kb.update(&txn)
            .await
            .map_err(|e| AppError::storage_write("knowledge base", e))?;

        // Re-ingestion replaces the previous passages
        ChunkEntity::delete_many()
            .filter(ChunkColumn::KnowledgeBaseId.eq(knowledge_base_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::storage_write("chunks", e))?;

        let count = chunks.len();
        if count > 0 {
            let models = chunks.into_iter().map(|chunk| ChunkActiveModel {
                id: Set(Uuid::new_v4()),
                knowledge_base_id: Set(knowledge_base_id),
                chunk_index: Set(chunk.chunk_index),
                content: Set(chunk.content),
                metadata: Set(chunk.metadata),
                created_at: Set(now.into()),
            });

            ChunkEntity::insert_many(models)
                .exec(&txn)
                .await
                .map_err(|e| AppError::storage_write("chunks", e))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::storage_write("knowledge base", e))?;

        Ok(count)
    }
}

// ============================================================================
// Conversation Operations
// ============================================================================

#[async_trait]
impl ConversationStore for Repository {
    async fn create_conversation(&self, new: NewConversation) -> Result<Conversation> {
        let conversation = ConversationActiveModel {
            id: Set(Uuid::new_v4()),
            agent_id: Set(new.agent_id),
            visitor_id: Set(new.visitor_id),
            visitor_name: Set(new.visitor_name),
            visitor_email: Set(new.visitor_email),
            status: Set("active".to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        conversation
            .insert(self.write_conn())
            .await
            .map_err(|e| AppError::storage_write("conversation", e))
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        // Primary, so a conversation created a moment ago is visible
        ConversationEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message> {
        let message = MessageActiveModel {
            // v7 ids sort by creation time, which breaks created_at ties
            id: Set(Uuid::now_v7()),
            conversation_id: Set(conversation_id),
            message_type: Set(String::from(kind)),
            content: Set(content.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        message
            .insert(self.write_conn())
            .await
            .map_err(|e| AppError::storage_write("message", e))
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: u64) -> Result<Vec<Message>> {
        MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(conversation_id))
            .order_by_desc(MessageColumn::CreatedAt)
            .order_by_desc(MessageColumn::Id)
            .limit(limit)
            .all(self.write_conn())
            .await
            .map_err(Into::into)
    }
}

// ============================================================================
// Analytics Operations
// ============================================================================

#[async_trait]
impl AnalyticsSink for Repository {
    async fn record(
        &self,
        agent_id: Uuid,
        event_type: &str,
        event_data: serde_json::Value,
    ) -> Result<()> {
        let event = AnalyticsActiveModel {
            id: Set(Uuid::new_v4()),
            agent_id: Set(agent_id),
            event_type: Set(event_type.to_string()),
            event_data: Set(event_data),
            created_at: Set(chrono::Utc::now().into()),
        };

        event
            .insert(self.write_conn())
            .await
            .map_err(|e| AppError::storage_write("analytics event", e))?;

        Ok(())
    }
}
