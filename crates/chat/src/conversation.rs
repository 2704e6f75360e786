//! Conversation store adapter
//!
//! Resolves the conversation a chat turn belongs to and rebuilds the
//! bounded history window sent to the model.

use crate::llm::ChatMessage;
use agentdesk_common::db::models::MessageKind;
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::store::{ConversationStore, NewConversation};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Optional visitor details sent with a chat turn
#[derive(Debug, Clone, Default)]
pub struct VisitorIdentity {
    pub visitor_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

fn generated_visitor_id() -> String {
    format!("visitor_{}", chrono::Utc::now().timestamp_millis())
}

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    history_limit: u64,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, history_limit: u64) -> Self {
        Self {
            store,
            history_limit,
        }
    }

    /// Return the conversation to append to, creating one when none is given.
    ///
    /// A supplied id must name an existing conversation of `agent_id`.
    #[instrument(skip(self, visitor), fields(agent_id = %agent_id))]
    pub async fn resolve_conversation(
        &self,
        agent_id: Uuid,
        conversation_id: Option<Uuid>,
        visitor: VisitorIdentity,
    ) -> Result<Uuid> {
        if let Some(id) = conversation_id {
            let conversation = self.store.find_conversation(id).await?.ok_or_else(|| {
                AppError::ConversationResolution {
                    message: format!("Conversation {} does not exist", id),
                }
            })?;

            if conversation.agent_id != agent_id {
                return Err(AppError::ConversationResolution {
                    message: format!("Conversation {} belongs to another agent", id),
                });
            }

            debug!(conversation_id = %id, "Reusing conversation");
            return Ok(id);
        }

        let visitor_id = visitor
            .visitor_id
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(generated_visitor_id);

        let conversation = self
            .store
            .create_conversation(NewConversation {
                agent_id,
                visitor_id,
                visitor_name: visitor.name,
                visitor_email: visitor.email,
            })
            .await
            .map_err(|e| AppError::ConversationResolution {
                message: format!("Failed to create conversation: {}", e),
            })?;

        info!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation.id)
    }

    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        content: &str,
    ) -> Result<()> {
        self.store
            .append_message(conversation_id, kind, content)
            .await
            .map(|_| ())
    }

    /// Prior turns in chronological order.
    ///
    /// The newest user message is the turn being answered; it is left out
    /// here and appended last by the caller.
    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    pub async fn recent_history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        let mut messages = self
            .store
            .recent_messages(conversation_id, self.history_limit)
            .await?;
        messages.reverse();

        if messages
            .last()
            .is_some_and(|m| m.kind() == MessageKind::User)
        {
            messages.pop();
        }

        Ok(messages
            .into_iter()
            .map(|m| match m.kind() {
                MessageKind::User => ChatMessage::user(m.content),
                MessageKind::Assistant => ChatMessage::assistant(m.content),
            })
            .collect())
    }
}
