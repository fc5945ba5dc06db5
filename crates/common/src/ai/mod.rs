//! External AI service abstractions
//!
//! Two capabilities are consumed as black boxes:
//! - Document understanding: extract text + typed entities from a PDF
//! - Chat completion: complete a text prompt (fallback enrichment and
//!   match ranking)
//!
//! Each has a trait, a REST client, and a mock for testing. Clients are
//! constructed once at process start and injected, never created per
//! request.

mod chat;
mod document;

pub use chat::{create_chat_model, ChatModel, MockChat, OpenAiChat};
pub use document::{
    create_document_ai, DocEntity, DocumentAi, GoogleDocumentAi, MockDocumentAi,
    ProcessedDocument,
};
