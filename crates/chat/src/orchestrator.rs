//! Chat-completion orchestrator
//!
//! One request runs these stages in order, and the first failure ends it:
//!
//! `ResolveAgent → ResolveCredential → ResolveConversation →
//! PersistUserMessage → Retrieve → AssembleHistory → InvokeModel →
//! PersistAssistantMessage → EmitAnalytics`
//!
//! The user turn is stored before the model is called so that a failed
//! call still leaves it in the log. Analytics failures are logged and
//! ignored.

use crate::conversation::{ConversationService, VisitorIdentity};
use crate::llm::{ApiCredential, ChatMessage, ChatModel, CompletionRequest};
use crate::retriever::ContextRetriever;
use agentdesk_common::config::LlmConfig;
use agentdesk_common::db::models::{Agent, MessageKind};
use agentdesk_common::errors::{AppError, Result};
use agentdesk_common::metrics::{record_model_error, record_retrieval, ChatMetrics};
use agentdesk_common::store::{AgentStore, AnalyticsSink};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const KNOWLEDGE_HEADER: &str = "Relevant information from knowledge base:";
const MESSAGE_SENT_EVENT: &str = "message_sent";

/// One inbound chat turn
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub agent_id: Uuid,
    pub message: String,
    pub conversation_id: Option<Uuid>,
    pub visitor: VisitorIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    ResolveAgent,
    ResolveCredential,
    ResolveConversation,
    PersistUserMessage,
    Retrieve,
    AssembleHistory,
    InvokeModel,
    PersistAssistantMessage,
    EmitAnalytics,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatStage::ResolveAgent => "resolve_agent",
            ChatStage::ResolveCredential => "resolve_credential",
            ChatStage::ResolveConversation => "resolve_conversation",
            ChatStage::PersistUserMessage => "persist_user_message",
            ChatStage::Retrieve => "retrieve",
            ChatStage::AssembleHistory => "assemble_history",
            ChatStage::InvokeModel => "invoke_model",
            ChatStage::PersistAssistantMessage => "persist_assistant_message",
            ChatStage::EmitAnalytics => "emit_analytics",
        };
        f.write_str(name)
    }
}

/// Await a stage, logging which one failed
async fn run_stage<T>(stage: ChatStage, fut: impl Future<Output = Result<T>>) -> Result<T> {
    fut.await
        .inspect_err(|e| warn!(stage = %stage, error = %e, "Chat stage failed"))
}

fn as_storage_write(entity: &str, err: AppError) -> AppError {
    match err {
        AppError::Database(e) => AppError::storage_write(entity, e),
        other => other,
    }
}

/// System prompt: agent instructions, plus retrieved knowledge when present
pub fn system_prompt(instructions: &str, context: &str) -> String {
    if context.is_empty() {
        instructions.to_string()
    } else {
        format!("{instructions}\n\n{KNOWLEDGE_HEADER}\n{context}")
    }
}

/// Full message list: the system message, prior turns, then the current turn
pub fn build_messages(system: String, history: Vec<ChatMessage>, message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history);
    messages.push(ChatMessage::user(message));
    messages
}

pub struct ChatOrchestrator {
    agents: Arc<dyn AgentStore>,
    conversations: ConversationService,
    retriever: Arc<dyn ContextRetriever>,
    model: Arc<dyn ChatModel>,
    analytics: Arc<dyn AnalyticsSink>,
    llm: LlmConfig,
}

impl ChatOrchestrator {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        conversations: ConversationService,
        retriever: Arc<dyn ContextRetriever>,
        model: Arc<dyn ChatModel>,
        analytics: Arc<dyn AnalyticsSink>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            agents,
            conversations,
            retriever,
            model,
            analytics,
            llm,
        }
    }

    /// Answer one chat turn
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        let metrics = ChatMetrics::start();
        let result = self.run(request).await;
        metrics.finish(result.is_ok());
        result
    }

    async fn run(&self, request: ChatRequest) -> Result<ChatReply> {
        let ChatRequest {
            agent_id,
            message,
            conversation_id,
            visitor,
        } = request;

        let agent = run_stage(ChatStage::ResolveAgent, async {
            self.agents
                .find_active_agent(agent_id)
                .await?
                .ok_or_else(|| AppError::AgentNotFound {
                    id: agent_id.to_string(),
                })
        })
        .await?;

        let credential = run_stage(ChatStage::ResolveCredential, self.resolve_credential(&agent)).await?;

        let conversation_id = run_stage(
            ChatStage::ResolveConversation,
            self.conversations
                .resolve_conversation(agent.id, conversation_id, visitor),
        )
        .await?;

        run_stage(ChatStage::PersistUserMessage, async {
            self.conversations
                .append_message(conversation_id, MessageKind::User, &message)
                .await
                .map_err(|e| as_storage_write("user message", e))
        })
        .await?;

        let context = run_stage(ChatStage::Retrieve, self.retriever.retrieve(agent.id, &message)).await?;
        record_retrieval(context.chars().count());

        let history = run_stage(
            ChatStage::AssembleHistory,
            self.conversations.recent_history(conversation_id),
        )
        .await?;

        let completion = self.completion_request(&agent, &context, history, &message);
        let reply = run_stage(ChatStage::InvokeModel, self.model.complete(&credential, &completion))
            .await
            .inspect_err(|e| {
                if let AppError::ModelInvocation { status, .. } = e {
                    record_model_error(&completion.model, *status);
                }
            })?;

        run_stage(ChatStage::PersistAssistantMessage, async {
            self.conversations
                .append_message(conversation_id, MessageKind::Assistant, &reply)
                .await
                .map_err(|e| as_storage_write("assistant message", e))
        })
        .await?;

        let event = serde_json::json!({
            "conversation_id": conversation_id,
            "message_length": message.chars().count(),
            "response_length": reply.chars().count(),
        });
        // Best effort: a failure is logged by run_stage and otherwise ignored
        let _ = run_stage(
            ChatStage::EmitAnalytics,
            self.analytics.record(agent.id, MESSAGE_SENT_EVENT, event),
        )
        .await;

        info!(%conversation_id, reply_chars = reply.len(), "Chat turn completed");

        Ok(ChatReply {
            message: reply,
            conversation_id,
        })
    }

    async fn resolve_credential(&self, agent: &Agent) -> Result<ApiCredential> {
        let profile = self.agents.find_profile(agent.user_id).await?;

        profile
            .as_ref()
            .and_then(|p| p.api_key())
            .map(ApiCredential::new)
            .ok_or_else(|| AppError::CredentialMissing {
                user_id: agent.user_id.to_string(),
            })
    }

    /// Model settings come from the agent, falling back to configured defaults
    fn completion_request(
        &self,
        agent: &Agent,
        context: &str,
        history: Vec<ChatMessage>,
        message: &str,
    ) -> CompletionRequest {
        let instructions = agent
            .instructions
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .unwrap_or(self.llm.default_system_prompt.as_str());

        CompletionRequest {
            model: agent
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.llm.default_model.clone()),
            messages: build_messages(system_prompt(instructions, context), history, message),
            temperature: agent.temperature.unwrap_or(self.llm.default_temperature),
            max_tokens: agent
                .max_tokens
                .and_then(|t| u32::try_from(t).ok())
                .unwrap_or(self.llm.default_max_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ScriptedModel};
    use crate::retriever::LexicalRetriever;
    use agentdesk_common::config::RetrievalConfig;
    use agentdesk_common::db::models::SourceType;
    use agentdesk_common::memory::{sample_agent, sample_knowledge_base, MemoryStore};
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        store: Arc<MemoryStore>,
        model: Arc<ScriptedModel>,
        orchestrator: ChatOrchestrator,
        agent: Agent,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(model);

        let user_id = uuid::Uuid::new_v4();
        store.insert_profile(user_id, Some("sk-owner"));
        let agent = sample_agent(user_id);
        store.insert_agent(agent.clone());

        let orchestrator = ChatOrchestrator::new(
            store.clone(),
            ConversationService::new(store.clone(), 10),
            Arc::new(LexicalRetriever::new(store.clone(), &RetrievalConfig::default())),
            model.clone(),
            store.clone(),
            LlmConfig::default(),
        );

        Harness {
            store,
            model,
            orchestrator,
            agent,
        }
    }

    fn turn(agent_id: Uuid, message: &str, conversation_id: Option<Uuid>) -> ChatRequest {
        ChatRequest {
            agent_id,
            message: message.to_string(),
            conversation_id,
            visitor: VisitorIdentity::default(),
        }
    }

    #[test]
    fn test_system_prompt_with_and_without_context() {
        assert_eq!(system_prompt("Be nice.", ""), "Be nice.");
        assert_eq!(
            system_prompt("Be nice.", "Opening hours 9-5"),
            "Be nice.\n\nRelevant information from knowledge base:\nOpening hours 9-5"
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ChatStage::InvokeModel.to_string(), "invoke_model");
        assert_eq!(ChatStage::PersistUserMessage.to_string(), "persist_user_message");
    }

    #[tokio::test]
    async fn test_new_conversation_then_reuse() {
        let h = harness(ScriptedModel::new().reply("Hello!").reply("We open at nine."));

        let first = h
            .orchestrator
            .handle(turn(h.agent.id, "Hi", None))
            .await
            .unwrap();
        assert_eq!(first.message, "Hello!");

        let second = h
            .orchestrator
            .handle(turn(h.agent.id, "When do you open?", Some(first.conversation_id)))
            .await
            .unwrap();
        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(h.store.conversations().len(), 1);

        let log: Vec<_> = h
            .store
            .messages(first.conversation_id)
            .into_iter()
            .map(|m| (m.kind(), m.content))
            .collect();
        assert_eq!(
            log,
            vec![
                (MessageKind::User, "Hi".to_string()),
                (MessageKind::Assistant, "Hello!".to_string()),
                (MessageKind::User, "When do you open?".to_string()),
                (MessageKind::Assistant, "We open at nine.".to_string()),
            ]
        );

        // Second call sends system, both prior turns, then the new question
        let requests = h.model.requests();
        let (credential, request) = &requests[1];
        assert_eq!(credential.expose(), "sk-owner");
        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.messages[3].content, "When do you open?");
    }

    #[tokio::test]
    async fn test_model_failure_keeps_user_message() {
        let h = harness(ScriptedModel::new().fail(401, "Incorrect API key provided"));

        let err = h
            .orchestrator
            .handle(turn(h.agent.id, "Hello?", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ModelInvocation { status: Some(401), .. }));

        let conversation = &h.store.conversations()[0];
        let messages = h.store.messages(conversation.id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::User);
        assert_eq!(messages[0].content, "Hello?");
        assert!(h.store.analytics_events().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_and_agent_overrides() {
        let h = harness(ScriptedModel::new());
        h.orchestrator
            .handle(turn(h.agent.id, "Hi", None))
            .await
            .unwrap();

        let (_, request) = &h.model.requests()[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(
            request.messages[0].content,
            "You answer questions about Acme products."
        );

        let mut tuned = sample_agent(h.agent.user_id);
        tuned.model = Some("gpt-4o".into());
        tuned.temperature = Some(0.0);
        tuned.max_tokens = Some(256);
        tuned.instructions = None;
        h.store.insert_agent(tuned.clone());

        h.orchestrator
            .handle(turn(tuned.id, "Hi", None))
            .await
            .unwrap();

        let (_, request) = &h.model.requests()[1];
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.messages[0].content, "You are a helpful AI assistant.");
    }

    #[tokio::test]
    async fn test_context_added_to_system_prompt() {
        let h = harness(ScriptedModel::new());
        let mut kb = sample_knowledge_base(h.agent.id, SourceType::Text);
        kb.processed = true;
        let kb_id = kb.id;
        h.store.insert_knowledge_base(kb);
        h.store.insert_chunk(kb_id, 0, "The quick brown fox lives in the forest.");

        h.orchestrator
            .handle(turn(h.agent.id, "Where is the fox?", None))
            .await
            .unwrap();

        let (_, request) = &h.model.requests()[0];
        let system = &request.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system
            .content
            .ends_with("Relevant information from knowledge base:\nThe quick brown fox lives in the forest."));
        assert_eq!(
            request.messages.iter().filter(|m| m.role == Role::System).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_analytics_event_recorded() {
        let h = harness(ScriptedModel::new().reply("Sure."));
        let reply = h
            .orchestrator
            .handle(turn(h.agent.id, "Can you help?", None))
            .await
            .unwrap();

        let events = h.store.analytics_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "message_sent");
        assert_eq!(events[0].agent_id, h.agent.id);
        assert_eq!(
            events[0].event_data["conversation_id"],
            reply.conversation_id.to_string()
        );
        assert_eq!(events[0].event_data["message_length"], 13);
        assert_eq!(events[0].event_data["response_length"], 5);
    }

    #[tokio::test]
    async fn test_analytics_failure_not_fatal() {
        let h = harness(ScriptedModel::new().reply("Still here."));
        h.store.fail_analytics(true);

        let reply = assert_ok!(h.orchestrator.handle(turn(h.agent.id, "Hi", None)).await);
        assert_eq!(reply.message, "Still here.");
        assert_eq!(h.store.messages(reply.conversation_id).len(), 2);
    }

    #[tokio::test]
    async fn test_inactive_or_unknown_agent() {
        let h = harness(ScriptedModel::new());
        let mut inactive = sample_agent(h.agent.user_id);
        inactive.is_active = false;
        h.store.insert_agent(inactive.clone());

        for agent_id in [inactive.id, Uuid::new_v4()] {
            let err = h
                .orchestrator
                .handle(turn(agent_id, "Hi", None))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::AgentNotFound { .. }));
        }
        assert!(h.store.conversations().is_empty());
        assert!(h.model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let h = harness(ScriptedModel::new());
        let owner = Uuid::new_v4();
        h.store.insert_profile(owner, Some("   "));
        let agent = sample_agent(owner);
        h.store.insert_agent(agent.clone());

        let err = assert_err!(h.orchestrator.handle(turn(agent.id, "Hi", None)).await);
        assert!(matches!(err, AppError::CredentialMissing { .. }));
        assert!(h.store.conversations().is_empty());
    }

    #[test]
    fn test_reply_serializes_camel_case() {
        let reply = ChatReply {
            message: "Hello!".into(),
            conversation_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["conversationId"], Uuid::nil().to_string());
    }
}
