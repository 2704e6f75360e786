//! Knowledge retrieval
//!
//! Lexical word-overlap scoring over stored chunks. No vectors are
//! involved; [`ContextRetriever`] is the seam for a semantic implementation.

use agentdesk_common::config::RetrievalConfig;
use agentdesk_common::db::models::{Chunk, KnowledgeBase};
use agentdesk_common::errors::Result;
use agentdesk_common::store::KnowledgeStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

const CONTEXT_SEPARATOR: &str = "\n\n";

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Context text for a message, empty when nothing is relevant
    async fn retrieve(&self, agent_id: Uuid, message: &str) -> Result<String>;
}

/// Lowercased whitespace tokens, duplicates kept
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Number of message tokens that occur verbatim among the chunk's tokens
pub fn score(message_tokens: &[String], chunk_text: &str) -> usize {
    let chunk_tokens: HashSet<String> = tokenize(chunk_text).into_iter().collect();
    message_tokens
        .iter()
        .filter(|token| chunk_tokens.contains(token.as_str()))
        .count()
}

/// Top `top_k` chunks by score, ties kept in load order
fn rank_chunks<'a>(message: &str, chunks: &'a [Chunk], top_k: usize) -> Vec<&'a Chunk> {
    let message_tokens = tokenize(message);

    let mut scored: Vec<(usize, &Chunk)> = chunks
        .iter()
        .map(|chunk| (score(&message_tokens, &chunk.content), chunk))
        .filter(|(score, _)| *score > 0)
        .collect();

    // Stable sort keeps retrieval order among equal scores
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, chunk)| chunk).collect()
}

/// Knowledge bases whose raw content contains the whole message
fn substring_fallback<'a>(
    message: &str,
    knowledge_bases: &'a [KnowledgeBase],
    top_k: usize,
) -> Vec<&'a str> {
    let needle = message.to_lowercase();

    knowledge_bases
        .iter()
        .filter_map(|kb| kb.content.as_deref())
        .filter(|content| content.to_lowercase().contains(&needle))
        .take(top_k)
        .collect()
}

pub struct LexicalRetriever {
    knowledge: Arc<dyn KnowledgeStore>,
    chunk_candidates: u64,
    top_k: usize,
}

impl LexicalRetriever {
    pub fn new(knowledge: Arc<dyn KnowledgeStore>, config: &RetrievalConfig) -> Self {
        Self {
            knowledge,
            chunk_candidates: config.chunk_candidates,
            top_k: config.top_k,
        }
    }
}

#[async_trait]
impl ContextRetriever for LexicalRetriever {
    #[instrument(skip(self, message), fields(agent_id = %agent_id))]
    async fn retrieve(&self, agent_id: Uuid, message: &str) -> Result<String> {
        let knowledge_bases = self.knowledge.processed_knowledge_bases(agent_id).await?;
        if knowledge_bases.is_empty() {
            debug!("No processed knowledge bases");
            return Ok(String::new());
        }

        let ids: Vec<Uuid> = knowledge_bases.iter().map(|kb| kb.id).collect();
        let chunks = self.knowledge.list_chunks(&ids, self.chunk_candidates).await?;

        let ranked = rank_chunks(message, &chunks, self.top_k);
        if !ranked.is_empty() {
            debug!(candidates = chunks.len(), selected = ranked.len(), "Chunks selected");
            return Ok(ranked
                .iter()
                .map(|chunk| chunk.content.as_str())
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR));
        }

        let fallback = substring_fallback(message, &knowledge_bases, self.top_k);
        debug!(
            candidates = chunks.len(),
            fallback_matches = fallback.len(),
            "No chunk overlap, used substring fallback"
        );
        Ok(fallback.join(CONTEXT_SEPARATOR))
    }
}
