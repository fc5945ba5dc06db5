//! Extraction worker error types

use invoiceflow_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to download stored file {path}: {message}")]
    Download { path: String, message: String },

    #[error("Document service error: {0}")]
    DocumentService(String),

    #[error("Chat model error: {0}")]
    Llm(String),

    #[error("Stage '{stage}' timed out after {seconds}s")]
    StageTimeout { stage: &'static str, seconds: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

impl From<AppError> for PipelineError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::DocumentService { message } => PipelineError::DocumentService(message),
            AppError::Llm { message } => PipelineError::Llm(message),
            AppError::QueueError { message } => PipelineError::Queue(message),
            other => PipelineError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_mapping() {
        let err: PipelineError = AppError::DocumentService {
            message: "no document".into(),
        }
        .into();
        assert!(matches!(err, PipelineError::DocumentService(_)));

        let err: PipelineError = AppError::Llm { message: "503".into() }.into();
        assert!(matches!(err, PipelineError::Llm(_)));
    }
}
