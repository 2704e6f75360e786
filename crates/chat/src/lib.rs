//! AgentDesk chat pipeline
//!
//! Answers a visitor's message for an agent: resolves the agent and its
//! owner's credential, keeps the conversation log, adds knowledge-base
//! context and calls the chat-completion model.

pub mod conversation;
pub mod llm;
pub mod orchestrator;
pub mod retriever;

pub use conversation::{ConversationService, VisitorIdentity};
pub use llm::{ApiCredential, ChatMessage, ChatModel, CompletionRequest, OpenAiChatModel, Role};
pub use orchestrator::{ChatOrchestrator, ChatReply, ChatRequest, ChatStage};
pub use retriever::{ContextRetriever, LexicalRetriever};

#[cfg(any(test, feature = "test-util"))]
pub use llm::ScriptedModel;
