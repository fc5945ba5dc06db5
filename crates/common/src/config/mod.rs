//! Configuration management for InvoiceFlow services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Blob storage configuration
    pub storage: StorageConfig,

    /// Document-understanding service configuration
    pub document_ai: DocumentAiConfig,

    /// Chat-model (LLM) service configuration
    pub llm: LlmConfig,

    /// Queue configuration (SQS)
    pub queue: QueueConfig,

    /// Extraction pipeline configuration
    pub pipeline: PipelineConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
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

    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
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
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for stored invoice blobs
    #[serde(default = "default_storage_root")]
    pub root: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentAiConfig {
    /// Provider: google, mock
    #[serde(default = "default_document_provider")]
    pub provider: String,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Cloud project ID
    pub project_id: Option<String>,

    /// Processor location, e.g. "us"
    pub location: Option<String>,

    /// Processor ID
    pub processor_id: Option<String>,

    /// Access token for the service (credentials handling is external)
    pub access_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_document_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the chat-model service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQS extraction queue URL
    pub extraction_queue_url: Option<String>,

    /// Dead letter queue URL
    pub dlq_url: Option<String>,

    /// Maximum messages to receive per poll
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: u32,

    /// Long polling timeout in seconds
    #[serde(default = "default_queue_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Visibility timeout in seconds
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Per-stage timeout for external calls in seconds
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Maximum pipeline attempts per invoice before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for retry backoff in seconds
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    /// Upper bound on a single retry delay in seconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,

    /// Bound on document text handed to the enrichment prompt, in characters
    #[serde(default = "default_enrichment_text_limit")]
    pub enrichment_text_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_root() -> String { "data/invoices".to_string() }
fn default_document_provider() -> String { "google".to_string() }
fn default_document_timeout() -> u64 { 60 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_model() -> String { crate::DEFAULT_CHAT_MODEL.to_string() }
fn default_llm_timeout() -> u64 { 30 }
fn default_llm_retries() -> u32 { 3 }
fn default_queue_batch_size() -> u32 { 10 }
fn default_queue_poll_timeout() -> u64 { 20 }
fn default_visibility_timeout() -> u64 { 300 }
fn default_stage_timeout() -> u64 { 90 }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_base_delay() -> u64 { 30 }
fn default_retry_max_delay() -> u64 { 900 }
fn default_enrichment_text_limit() -> usize { 3000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "invoiceflow".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

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
                    .separator("__")
                    .try_parsing(true)
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
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the per-stage pipeline timeout as Duration
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl PipelineConfig {
    /// Delay before retry attempt `attempt` (0-based), capped at the
    /// configured maximum.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self.retry_base_delay_secs.saturating_mul(1u64 << attempt.min(16));
        Duration::from_secs(exp.min(self.retry_max_delay_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/invoiceflow".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            storage: StorageConfig {
                root: default_storage_root(),
            },
            document_ai: DocumentAiConfig {
                provider: default_document_provider(),
                api_base: None,
                project_id: None,
                location: None,
                processor_id: None,
                access_token: None,
                timeout_secs: default_document_timeout(),
            },
            llm: LlmConfig {
                provider: default_llm_provider(),
                api_key: None,
                api_base: None,
                model: default_llm_model(),
                timeout_secs: default_llm_timeout(),
                max_retries: default_llm_retries(),
            },
            queue: QueueConfig {
                extraction_queue_url: None,
                dlq_url: None,
                batch_size: default_queue_batch_size(),
                poll_timeout_secs: default_queue_poll_timeout(),
                visibility_timeout_secs: default_visibility_timeout(),
            },
            pipeline: PipelineConfig {
                stage_timeout_secs: default_stage_timeout(),
                max_attempts: default_max_attempts(),
                retry_base_delay_secs: default_retry_base_delay(),
                retry_max_delay_secs: default_retry_max_delay(),
                enrichment_text_limit: default_enrichment_text_limit(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.pipeline.enrichment_text_limit, 3000);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/invoiceflow");
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let pipeline = AppConfig::default().pipeline;
        assert_eq!(pipeline.retry_delay(0), Duration::from_secs(30));
        assert_eq!(pipeline.retry_delay(1), Duration::from_secs(60));
        assert_eq!(pipeline.retry_delay(10), Duration::from_secs(900));
    }
}
