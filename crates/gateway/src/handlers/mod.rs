//! API handlers module

pub mod chat;
pub mod crawl;
pub mod health;
pub mod ingest;
