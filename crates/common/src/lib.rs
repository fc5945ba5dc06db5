//! InvoiceFlow Common Library
//!
//! Shared code for the InvoiceFlow services including:
//! - Database models and repository patterns
//! - Blob storage abstraction
//! - Document-understanding and chat-model client abstractions
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod ai;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod queue;
pub mod storage;

// Re-export commonly used types
pub use ai::{ChatModel, DocumentAi};
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use storage::BlobStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chat model used for fallback enrichment and match ranking
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// MIME type accepted by the upload boundary and sent to the document service
pub const PDF_MIME_TYPE: &str = "application/pdf";
