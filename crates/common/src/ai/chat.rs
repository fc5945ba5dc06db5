//! Chat-model completion client
//!
//! Used at two pipeline sites: fallback field enrichment and
//! ambiguous-match ranking. Both call sites parse the returned content
//! defensively and degrade gracefully on malformed output; this client
//! only surfaces transport/API failures.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for chat completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a single-user-message prompt, returning the raw content
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-style chat completion client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiChat {
    /// Create a new chat client
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| crate::DEFAULT_CHAT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries,
        }
    }

    /// Make request with retry
    async fn request_with_retry(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(prompt, max_tokens).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Chat completion request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Llm {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::Llm {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AppError::Llm {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        self.request_with_retry(prompt, max_tokens).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock chat model for testing: returns scripted responses in order,
/// then repeats the last one.
pub struct MockChat {
    responses: tokio::sync::Mutex<Vec<String>>,
    prompts: tokio::sync::Mutex<Vec<String>>,
}

impl MockChat {
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(
                responses.into_iter().map(String::from).collect(),
            ),
            prompts: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, for assertions
    pub async fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());

        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(AppError::Llm {
                message: "MockChat has no scripted response".to_string(),
            });
        }
        if responses.len() == 1 {
            return Ok(responses[0].clone());
        }
        Ok(responses.remove(0))
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

/// Create a chat model based on configuration
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key required".to_string(),
            })?;
            Ok(Arc::new(OpenAiChat::new(
                key,
                Some(config.model.clone()),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )))
        }
        "mock" => Ok(Arc::new(MockChat::with_responses(vec!["{}"]))),
        other => {
            tracing::warn!(provider = other, "Unknown chat provider, using mock");
            Ok(Arc::new(MockChat::with_responses(vec!["{}"])))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_in_order() {
        let chat = MockChat::with_responses(vec!["first", "second"]);
        assert_eq!(chat.complete("a", 10).await.unwrap(), "first");
        assert_eq!(chat.complete("b", 10).await.unwrap(), "second");
        // Last response repeats
        assert_eq!(chat.complete("c", 10).await.unwrap(), "second");
        assert_eq!(chat.seen_prompts().await.len(), 3);
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"choices": [{"message": {"content": " 2 "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some(" 2 ")
        );
    }
}
