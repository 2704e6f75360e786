//! AgentDesk Common Library
//!
//! Shared code for the AgentDesk crates including:
//! - Database models and the repository implementing the storage ports
//! - Storage ports consumed by the ingestion and chat pipelines
//! - Uploaded document storage
//! - Error types and handling
//! - Configuration management
//! - Retry policy for outbound calls
//! - Metrics and observability

pub mod blob;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod resilience;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

// Re-export commonly used types
pub use blob::BlobStore;
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use resilience::RetryPolicy;
pub use store::{AgentStore, AnalyticsSink, ConversationStore, KnowledgeStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
