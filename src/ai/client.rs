//! LLM (`OpenAI`) API client module
//!
//! Encapsulates the chat-completions call used to answer chat questions.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::BotError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a question into an answer. Implementations keep no conversation
/// state between calls.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a
    /// response with no candidate answers. Nothing is retried.
    async fn complete(&self, query: &str) -> Result<String, BotError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// LLM API client answering chat questions
pub struct OpenAiClient {
    http: Client,
    api_base: String,
    api_key: String,
    model_name: String,
    system_message: String,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_base: &str,
        api_key: String,
        model_name: String,
        system_message: String,
    ) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BotError::HttpError(format!("Failed to build OpenAI HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model_name,
            system_message,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The fixed system framing followed by the user's question.
    #[must_use]
    pub fn build_prompt(&self, query: &str) -> Vec<ChatCompletionMessage> {
        vec![
            ChatCompletionMessage {
                role: MessageRole::system,
                content: Content::Text(self.system_message.clone()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
            ChatCompletionMessage {
                role: MessageRole::user,
                content: Content::Text(query.to_string()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
        ]
    }
}

#[async_trait]
impl CompletionEngine for OpenAiClient {
    async fn complete(&self, query: &str) -> Result<String, BotError> {
        let prompt = self.build_prompt(query);

        #[cfg(feature = "debug-logs")]
        info!("Using ChatGPT prompt:\n{:?}", prompt);

        #[cfg(not(feature = "debug-logs"))]
        info!(
            model = %self.model_name,
            "Requesting completion with {} messages in prompt",
            prompt.len()
        );

        let request_body = json!({
            "model": self.model_name,
            "messages": build_messages_from_prompt(&prompt),
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| BotError::HttpError(format!("OpenAI API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::OpenAIError(format!(
                "non ok response {status}: {error_text}"
            )));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            BotError::OpenAIError(format!("Failed to parse OpenAI response: {e}"))
        })?;

        debug!("OpenAI returned {} choices", completion.choices.len());

        completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BotError::OpenAIError("0 choices returned".to_string()))?
            .message
            .content
            .ok_or_else(|| BotError::OpenAIError("No text in response".to_string()))
    }
}

/// Converts the typed prompt into the role/content pairs the endpoint takes.
pub(crate) fn build_messages_from_prompt(prompt: &[ChatCompletionMessage]) -> Vec<Value> {
    prompt
        .iter()
        .filter_map(|msg| {
            let role = match msg.role {
                MessageRole::system => "system",
                MessageRole::user => "user",
                MessageRole::assistant => "assistant",
                MessageRole::function | MessageRole::tool => return None,
            };
            match &msg.content {
                Content::Text(text) => Some(json!({ "role": role, "content": text })),
                Content::ImageUrl(_) => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> OpenAiClient {
        OpenAiClient::new(
            base,
            "sk-test".to_string(),
            "gpt-test".to_string(),
            "You answer Twitch chat.".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_prompt_puts_system_message_first() {
        let messages = build_messages_from_prompt(&client("http://localhost").build_prompt("hi"));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You answer Twitch chat.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-test",
                "messages": [
                    {"role": "system", "content": "You answer Twitch chat."},
                    {"role": "user", "content": "what is rust"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": "a language"}},
                        {"index": 1, "message": {"role": "assistant", "content": "a fungus"}}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let answer = client(&server.url()).complete("what is rust").await.unwrap();

        assert_eq!(answer, "a language");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_errors_on_zero_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(json!({ "choices": [] }).to_string())
            .create_async()
            .await;

        let err = client(&server.url()).complete("q").await.unwrap_err();
        assert!(matches!(err, BotError::OpenAIError(ref m) if m.contains("0 choices")));
    }

    #[tokio::test]
    async fn test_complete_errors_on_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = client(&server.url()).complete("q").await.unwrap_err();
        assert!(matches!(err, BotError::OpenAIError(ref m) if m.contains("overloaded")));
    }

    #[tokio::test]
    async fn test_complete_errors_on_transport_failure() {
        // Nothing listens on port 9 locally.
        let err = client("http://127.0.0.1:9").complete("q").await.unwrap_err();
        assert!(matches!(err, BotError::HttpError(_)));
    }
}
