//! AgentDesk ingestion
//!
//! Populates knowledge bases and their chunks:
//! 1. Fetches a page or downloads an uploaded document
//! 2. Extracts and cleans its text
//! 3. Chunks the text into passages
//! 4. Commits the knowledge base and its chunks together
//!
//! Also hosts the multi-page crawler behind `/web-scraper`.

pub mod chunker;
pub mod crawler;
pub mod extract;
pub mod fetch;
pub mod html;
pub mod processor;

pub use chunker::{chunk_text, ChunkingConfig};
pub use crawler::{CrawlOptions, CrawlReport, Crawler, ScrapedPage};
pub use fetch::{HttpFetcher, PageFetcher};
pub use processor::{IngestionProcessor, IngestionSummary};
