//! SQS queue integration for async invoice processing
//!
//! Provides:
//! - SQS client wrapper
//! - Message serialization/deserialization
//! - Delayed re-enqueue for bounded retry backoff
//! - Dead letter queue configuration

use crate::errors::{AppError, Result};
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client as SqsClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// SQS queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue URL
    pub url: String,
    /// Dead letter queue URL (optional)
    pub dlq_url: Option<String>,
    /// Maximum receive count before moving to DLQ
    pub max_receive_count: u32,
    /// Visibility timeout in seconds
    pub visibility_timeout: i32,
    /// Wait time for long polling (seconds)
    pub wait_time_seconds: i32,
    /// Maximum number of messages per poll
    pub max_messages: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            dlq_url: None,
            max_receive_count: 3,
            visibility_timeout: 300,
            wait_time_seconds: 20,
            max_messages: 10,
        }
    }
}

/// SQS queue client wrapper
pub struct Queue {
    client: SqsClient,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue client
    pub async fn new(config: QueueConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = SqsClient::new(&aws_config);

        Ok(Self { client, config })
    }

    /// Create with existing AWS config
    pub fn with_client(client: SqsClient, config: QueueConfig) -> Self {
        Self { client, config }
    }

    /// Send a message to the queue
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<String> {
        let body = serde_json::to_string(message)
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to serialize message: {}", e)
            })?;

        let result = self.client
            .send_message()
            .queue_url(&self.config.url)
            .message_body(&body)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to send message: {}", e),
            })?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, "Message sent to queue");

        Ok(message_id)
    }

    /// Send a message with delay (SQS caps delay at 900 seconds)
    pub async fn send_delayed<T: Serialize>(&self, message: &T, delay_seconds: i32) -> Result<String> {
        let body = serde_json::to_string(message)
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to serialize message: {}", e)
            })?;

        let result = self.client
            .send_message()
            .queue_url(&self.config.url)
            .message_body(&body)
            .delay_seconds(delay_seconds.min(900))
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to send delayed message: {}", e),
            })?;

        let message_id = result.message_id.unwrap_or_default();
        debug!(message_id = %message_id, delay_seconds, "Delayed message sent to queue");

        Ok(message_id)
    }

    /// Receive messages from the queue
    pub async fn receive(&self) -> Result<Vec<Message>> {
        let result = self.client
            .receive_message()
            .queue_url(&self.config.url)
            .max_number_of_messages(self.config.max_messages)
            .visibility_timeout(self.config.visibility_timeout)
            .wait_time_seconds(self.config.wait_time_seconds)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to receive messages: {}", e),
            })?;

        let messages = result.messages.unwrap_or_default();
        debug!(count = messages.len(), "Received messages from queue");

        Ok(messages)
    }

    /// Delete a message after processing
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| AppError::QueueError {
                message: format!("Failed to delete message: {}", e),
            })?;

        debug!("Message deleted from queue");
        Ok(())
    }

    /// Parse message body as JSON
    pub fn parse_message<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let body = message.body.as_ref().ok_or_else(|| AppError::QueueError {
            message: "Message has no body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| AppError::QueueError {
            message: format!("Failed to parse message: {}", e),
        })
    }
}

/// Extraction job message: one per pipeline run of one invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJobMessage {
    pub invoice_id: Uuid,
    /// Blob-store key of the uploaded PDF
    pub file_path: String,
    /// 0-based attempt counter; incremented on each re-enqueue
    #[serde(default)]
    pub attempt: u32,
}

impl ExtractionJobMessage {
    pub fn new(invoice_id: Uuid, file_path: impl Into<String>) -> Self {
        Self {
            invoice_id,
            file_path: file_path.into(),
            attempt: 0,
        }
    }

    /// The message for the next attempt of the same invoice
    pub fn next_attempt(&self) -> Self {
        Self {
            invoice_id: self.invoice_id,
            file_path: self.file_path.clone(),
            attempt: self.attempt + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_message_serialization() {
        let msg = ExtractionJobMessage::new(Uuid::new_v4(), "1700000000000_invoice.pdf");

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ExtractionJobMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(msg.invoice_id, parsed.invoice_id);
        assert_eq!(msg.file_path, parsed.file_path);
        assert_eq!(parsed.attempt, 0);
    }

    #[test]
    fn test_attempt_defaults_to_zero() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"invoice_id": "{}", "file_path": "a.pdf"}}"#, id);
        let parsed: ExtractionJobMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.attempt, 0);
        assert_eq!(parsed.next_attempt().attempt, 1);
    }
}
