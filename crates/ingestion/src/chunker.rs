//! Text chunking module
//!
//! Packs paragraphs into passages of at most `max_chars` characters. A
//! paragraph longer than the limit is broken into sentences first; a single
//! sentence longer than the limit is emitted whole. Passages of
//! `min_chars` characters or fewer are dropped.

use agentdesk_common::config::IngestionConfig;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;
use tracing::debug;

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph break regex is valid"));

static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("sentence end regex is valid"));

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum passage size in characters
    pub max_chars: usize,
    /// Passages this short or shorter are dropped
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            min_chars: 50,
        }
    }
}

impl From<&IngestionConfig> for ChunkingConfig {
    fn from(config: &IngestionConfig) -> Self {
        Self {
            max_chars: config.max_chunk_chars,
            min_chars: config.min_chunk_chars,
        }
    }
}

/// Split text into passages.
///
/// The returned iterator is lazy and borrows `text`; call again (or clone
/// it before consuming) to restart.
pub fn chunk_text<'a>(text: &'a str, config: &ChunkingConfig) -> Chunks<'a> {
    Chunks {
        rest: Some(text),
        sentences: VecDeque::new(),
        current: String::new(),
        current_len: 0,
        config: config.clone(),
    }
}

/// Lazy passage iterator returned by [`chunk_text`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    /// Text not yet split into paragraphs
    rest: Option<&'a str>,
    /// Pending sentences of an oversized paragraph
    sentences: VecDeque<(&'a str, &'static str)>,
    current: String,
    /// Length of `current` in characters
    current_len: usize,
    config: ChunkingConfig,
}

impl<'a> Chunks<'a> {
    /// Next packing unit and the separator that joins it to the passage
    fn next_unit(&mut self) -> Option<(&'a str, &'static str)> {
        if let Some(unit) = self.sentences.pop_front() {
            return Some(unit);
        }

        loop {
            let rest = self.rest?;
            let (paragraph, remainder) = match PARAGRAPH_BREAK_RE.find(rest) {
                Some(m) => (&rest[..m.start()], Some(&rest[m.end()..])),
                None => (rest, None),
            };
            self.rest = remainder;

            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if paragraph.chars().count() <= self.config.max_chars {
                return Some((paragraph, PARAGRAPH_SEPARATOR));
            }

            self.sentences = split_sentences(paragraph)
                .enumerate()
                .map(|(i, s)| {
                    let sep = if i == 0 { PARAGRAPH_SEPARATOR } else { SENTENCE_SEPARATOR };
                    (s, sep)
                })
                .collect();

            if let Some(unit) = self.sentences.pop_front() {
                return Some(unit);
            }
        }
    }

    /// Apply the length floor to a finished passage
    fn accept(&self, passage: String) -> Option<String> {
        let trimmed = passage.trim();
        let len = trimmed.chars().count();
        if len > self.config.min_chars {
            Some(trimmed.to_string())
        } else {
            if len > 0 {
                debug!(chars = len, "Dropping short passage");
            }
            None
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let Some((unit, separator)) = self.next_unit() else {
                if self.current.is_empty() {
                    return None;
                }
                let last = std::mem::take(&mut self.current);
                self.current_len = 0;
                return self.accept(last);
            };

            let unit_len = unit.chars().count();

            if self.current.is_empty() {
                self.current.push_str(unit);
                self.current_len = unit_len;
                continue;
            }

            let joined_len = self.current_len + separator.chars().count() + unit_len;
            if joined_len > self.config.max_chars {
                let finished = std::mem::replace(&mut self.current, unit.to_string());
                self.current_len = unit_len;
                if let Some(passage) = self.accept(finished) {
                    return Some(passage);
                }
            } else {
                self.current.push_str(separator);
                self.current.push_str(unit);
                self.current_len = joined_len;
            }
        }
    }
}

/// Sentences of a paragraph, keeping their terminal punctuation
fn split_sentences(paragraph: &str) -> impl Iterator<Item = &str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END_RE.find_iter(paragraph) {
        let end = m.start() + m.as_str().trim_end().len();
        sentences.push(&paragraph[start..end]);
        start = m.end();
    }
    sentences.push(&paragraph[start..]);

    sentences.into_iter().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_chars: usize, min_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            min_chars,
        }
    }

    #[test]
    fn test_paragraphs_are_packed() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks: Vec<_> = chunk_text(text, &config(50, 0)).collect();

        assert_eq!(
            chunks,
            vec![
                "First paragraph here.\n\nSecond paragraph here.",
                "Third paragraph here.",
            ]
        );
    }

    #[test]
    fn test_long_paragraph_falls_back_to_sentences() {
        let text = "Alpha beta gamma. Delta epsilon zeta! Eta theta iota? Kappa lambda mu.";
        let chunks: Vec<_> = chunk_text(text, &config(40, 0)).collect();

        assert_eq!(
            chunks,
            vec![
                "Alpha beta gamma. Delta epsilon zeta!",
                "Eta theta iota? Kappa lambda mu.",
            ]
        );
    }

    #[test]
    fn test_oversized_sentence_emitted_whole() {
        let long_sentence = "word ".repeat(30).trim_end().to_string();
        let text = format!("Short one. {}. Tail sentence.", long_sentence);
        let chunks: Vec<_> = chunk_text(&text, &config(40, 0)).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], format!("{}.", long_sentence));
        for chunk in [&chunks[0], &chunks[2]] {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn test_short_passages_dropped() {
        let text = format!("Tiny.\n\n{}", "x".repeat(60));
        let chunks: Vec<_> = chunk_text(&text, &config(30, 50)).collect();

        assert_eq!(chunks, vec!["x".repeat(60)]);
    }

    #[test]
    fn test_floor_is_exclusive() {
        let exactly_fifty = "y".repeat(50);
        assert_eq!(chunk_text(&exactly_fifty, &ChunkingConfig::default()).count(), 0);

        let fifty_one = "y".repeat(51);
        assert_eq!(chunk_text(&fifty_one, &ChunkingConfig::default()).count(), 1);
    }

    #[test]
    fn test_bounds_and_word_order() {
        let paragraph = "The quick brown fox jumps over the lazy dog. ".repeat(12);
        let text = format!("{}\n\n{}\n\n   \n\n{}", paragraph, "Closing remarks follow here.", paragraph);
        let max = 120;
        let chunks: Vec<_> = chunk_text(&text, &config(max, 0)).collect();

        for chunk in &chunks {
            assert!(chunk.chars().count() <= max, "chunk too long: {}", chunk.len());
        }

        let source_words: Vec<_> = text.split_whitespace().collect();
        let chunk_words: Vec<_> = chunks.iter().flat_map(|c| c.split_whitespace()).collect();
        assert_eq!(source_words, chunk_words);
    }

    #[test]
    fn test_multibyte_counted_in_chars() {
        let text = "é".repeat(60);
        let chunks: Vec<_> = chunk_text(&text, &config(60, 50)).collect();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_restartable() {
        let text = "One paragraph that is long enough to keep around.\n\nAnother one.";
        let chunks = chunk_text(text, &config(40, 0));
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(chunk_text("", &ChunkingConfig::default()).count(), 0);
        assert_eq!(chunk_text("\n\n  \n\n", &ChunkingConfig::default()).count(), 0);
    }
}
