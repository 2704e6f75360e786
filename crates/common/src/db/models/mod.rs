//! SeaORM entity models
//!
//! Database entities for AgentDesk

mod agent;
mod analytics;
mod chunk;
mod conversation;
mod knowledge_base;
mod message;
mod profile;

pub use agent::{
    Entity as AgentEntity,
    Model as Agent,
    ActiveModel as AgentActiveModel,
    Column as AgentColumn,
};

pub use profile::{
    Entity as ProfileEntity,
    Model as Profile,
    ActiveModel as ProfileActiveModel,
    Column as ProfileColumn,
};

pub use knowledge_base::{
    Entity as KnowledgeBaseEntity,
    Model as KnowledgeBase,
    ActiveModel as KnowledgeBaseActiveModel,
    Column as KnowledgeBaseColumn,
    SourceType,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};

pub use conversation::{
    Entity as ConversationEntity,
    Model as Conversation,
    ActiveModel as ConversationActiveModel,
    Column as ConversationColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
    MessageKind,
};

pub use analytics::{
    Entity as AnalyticsEntity,
    Model as AnalyticsEvent,
    ActiveModel as AnalyticsActiveModel,
    Column as AnalyticsColumn,
};
