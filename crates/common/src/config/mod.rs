//! Configuration management for AgentDesk services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Chat-completion API configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Knowledge ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Retrieval and history window configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Uploaded document storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry policy for outbound calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply the bundled SQL migrations at start-up
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completion API
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model used when the agent has none configured
    #[serde(default = "default_llm_model")]
    pub default_model: String,

    /// Temperature used when the agent has none configured
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    /// Max response tokens used when the agent has none configured
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// System prompt used when the agent has no instructions
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Maximum passage size in characters
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Passages this short or shorter are dropped
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Minimum extracted text length for a scraped page
    #[serde(default = "default_min_website_chars")]
    pub min_website_chars: usize,

    /// Minimum extracted text length for a document
    #[serde(default = "default_min_document_chars")]
    pub min_document_chars: usize,

    /// User-Agent header sent with page fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Page fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Delay between crawled pages in milliseconds
    #[serde(default = "default_crawl_delay")]
    pub crawl_delay_ms: u64,

    /// Page budget when the request gives none
    #[serde(default = "default_crawl_max_pages")]
    pub crawl_default_max_pages: usize,

    /// Upper bound for a requested page budget
    #[serde(default = "default_crawl_page_limit")]
    pub crawl_page_limit: usize,

    /// Characters of cleaned text kept per crawled page
    #[serde(default = "default_crawl_content_chars")]
    pub crawl_content_chars: usize,

    /// Links reported per crawled page
    #[serde(default = "default_crawl_links")]
    pub crawl_links_per_page: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Chunks loaded for scoring per request
    #[serde(default = "default_chunk_candidates")]
    pub chunk_candidates: u64,

    /// Chunks (or fallback knowledge bases) kept in the context
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Messages fetched for the history window
    #[serde(default = "default_history_limit")]
    pub history_limit: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage backend: fs, http
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Root directory for the fs backend
    #[serde(default = "default_storage_root")]
    pub root: String,

    /// Object storage API base URL for the http backend
    pub base_url: Option<String>,

    /// Bucket holding uploaded documents
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Service key for the http backend
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for a single backoff interval in milliseconds
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second across the POST routes
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_database_url() -> String { "postgres://localhost/agentdesk".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_llm_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f64 { 0.7 }
fn default_max_tokens() -> u32 { 1000 }
fn default_system_prompt() -> String { "You are a helpful AI assistant.".to_string() }
fn default_llm_timeout() -> u64 { 45 }
fn default_max_chunk_chars() -> usize { 1000 }
fn default_min_chunk_chars() -> usize { 50 }
fn default_min_website_chars() -> usize { 100 }
fn default_min_document_chars() -> usize { 50 }
fn default_user_agent() -> String { "Mozilla/5.0 (compatible; AgentDesk-Scraper/1.0)".to_string() }
fn default_fetch_timeout() -> u64 { 20 }
fn default_crawl_delay() -> u64 { 500 }
fn default_crawl_max_pages() -> usize { 10 }
fn default_crawl_page_limit() -> usize { 50 }
fn default_crawl_content_chars() -> usize { 8000 }
fn default_crawl_links() -> usize { 10 }
fn default_chunk_candidates() -> u64 { 10 }
fn default_top_k() -> usize { 3 }
fn default_history_limit() -> u64 { 10 }
fn default_storage_backend() -> String { "fs".to_string() }
fn default_storage_root() -> String { "./data/documents".to_string() }
fn default_bucket() -> String { "documents".to_string() }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_interval() -> u64 { 200 }
fn default_multiplier() -> f64 { 2.0 }
fn default_max_interval() -> u64 { 2000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "agentdesk".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl IngestionConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_millis(self.crawl_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: false,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            default_model: default_llm_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            default_system_prompt: default_system_prompt(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            min_chunk_chars: default_min_chunk_chars(),
            min_website_chars: default_min_website_chars(),
            min_document_chars: default_min_document_chars(),
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout(),
            crawl_delay_ms: default_crawl_delay(),
            crawl_default_max_pages: default_crawl_max_pages(),
            crawl_page_limit: default_crawl_page_limit(),
            crawl_content_chars: default_crawl_content_chars(),
            crawl_links_per_page: default_crawl_links(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_candidates: default_chunk_candidates(),
            top_k: default_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: default_storage_root(),
            base_url: None,
            bucket: default_bucket(),
            service_key: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            ingestion: IngestionConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
