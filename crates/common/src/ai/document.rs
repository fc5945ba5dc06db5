//! Document-understanding service client
//!
//! Sends raw PDF bytes to the processor endpoint and returns the
//! recognized text plus typed entities. The absence of a document
//! object in the response is a hard failure for that invoice.

use crate::config::DocumentAiConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A typed span of extracted information, possibly with nested
/// sub-properties (e.g. `line_item` → `line_item/description`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocEntity {
    #[serde(rename = "type", default)]
    pub entity_type: String,

    #[serde(rename = "mentionText", default)]
    pub mention_text: String,

    #[serde(default)]
    pub properties: Vec<DocEntity>,
}

impl DocEntity {
    pub fn new(entity_type: impl Into<String>, mention_text: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            mention_text: mention_text.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<DocEntity>) -> Self {
        self.properties = properties;
        self
    }

    /// Text of the first sub-property with the given type
    pub fn property_text(&self, property_type: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.entity_type == property_type)
            .map(|p| p.mention_text.as_str())
    }
}

/// The document object returned by the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedDocument {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub entities: Vec<DocEntity>,
}

/// Trait for document understanding
#[async_trait]
pub trait DocumentAi: Send + Sync {
    /// Process a PDF and return the recognized document
    async fn process(&self, pdf_bytes: &[u8]) -> Result<ProcessedDocument>;
}

/// Google Document AI REST client
pub struct GoogleDocumentAi {
    client: reqwest::Client,
    base_url: String,
    processor: String,
    access_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct ProcessResponse {
    document: Option<ProcessedDocument>,
}

impl GoogleDocumentAi {
    /// Create a new client for one processor resource,
    /// `projects/{project}/locations/{location}/processors/{id}`.
    pub fn new(
        project_id: &str,
        location: &str,
        processor_id: &str,
        access_token: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url
            .unwrap_or_else(|| format!("https://{}-documentai.googleapis.com", location));

        Self {
            client,
            base_url,
            processor: format!(
                "projects/{}/locations/{}/processors/{}",
                project_id, location, processor_id
            ),
            access_token,
        }
    }
}

#[async_trait]
impl DocumentAi for GoogleDocumentAi {
    async fn process(&self, pdf_bytes: &[u8]) -> Result<ProcessedDocument> {
        let url = format!("{}/v1/{}:process", self.base_url, self.processor);

        let request = ProcessRequest {
            raw_document: RawDocument {
                content: BASE64.encode(pdf_bytes),
                mime_type: crate::PDF_MIME_TYPE.to_string(),
            },
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref token) = self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| AppError::DocumentService {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DocumentService {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ProcessResponse = response.json().await.map_err(|e| {
            AppError::DocumentService {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        result.document.ok_or_else(|| AppError::DocumentService {
            message: "No document returned from document service".to_string(),
        })
    }
}

/// Mock document service for testing
pub struct MockDocumentAi {
    document: Option<ProcessedDocument>,
}

impl MockDocumentAi {
    /// Always return the given document
    pub fn returning(document: ProcessedDocument) -> Self {
        Self { document: Some(document) }
    }

    /// Always fail the way the real service does when no document comes back
    pub fn failing() -> Self {
        Self { document: None }
    }
}

#[async_trait]
impl DocumentAi for MockDocumentAi {
    async fn process(&self, _pdf_bytes: &[u8]) -> Result<ProcessedDocument> {
        self.document.clone().ok_or_else(|| AppError::DocumentService {
            message: "No document returned from document service".to_string(),
        })
    }
}

/// Create a document-understanding client based on configuration
pub fn create_document_ai(config: &DocumentAiConfig) -> Result<Arc<dyn DocumentAi>> {
    match config.provider.as_str() {
        "google" => {
            let project_id = config.project_id.as_deref().ok_or_else(|| {
                AppError::Configuration {
                    message: "document_ai.project_id required".to_string(),
                }
            })?;
            let location = config.location.as_deref().unwrap_or("us");
            let processor_id = config.processor_id.as_deref().ok_or_else(|| {
                AppError::Configuration {
                    message: "document_ai.processor_id required".to_string(),
                }
            })?;

            Ok(Arc::new(GoogleDocumentAi::new(
                project_id,
                location,
                processor_id,
                config.access_token.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )))
        }
        "mock" => Ok(Arc::new(MockDocumentAi::returning(ProcessedDocument::default()))),
        other => {
            tracing::warn!(provider = other, "Unknown document provider, using mock");
            Ok(Arc::new(MockDocumentAi::returning(ProcessedDocument::default())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "document": {
                "text": "Invoice text",
                "entities": [
                    {"type": "total_amount", "mentionText": "$450.00"},
                    {"type": "line_item", "mentionText": "row", "properties": [
                        {"type": "line_item/description", "mentionText": "Leak repair"}
                    ]}
                ]
            }
        }"#;

        let parsed: ProcessResponse = serde_json::from_str(json).unwrap();
        let doc = parsed.document.unwrap();
        assert_eq!(doc.text, "Invoice text");
        assert_eq!(doc.entities.len(), 2);
        assert_eq!(
            doc.entities[1].property_text("line_item/description"),
            Some("Leak repair")
        );
    }

    #[test]
    fn test_missing_document_is_none() {
        let parsed: ProcessResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.document.is_none());
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockDocumentAi::failing();
        let err = mock.process(b"%PDF").await.unwrap_err();
        assert!(err.to_string().contains("No document returned"));
    }
}
