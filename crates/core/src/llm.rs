use crate::error::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.groq.com/openai";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

const DEFAULT_TEMPERATURE: f64 = 0.9;
const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion service invoked once per prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
/// Defaults target Groq's hosted llama-3.3-70b-versatile.
pub struct GroqChatModel {
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl GroqChatModel {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)?;

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::Request("chat api key is empty".to_string()));
        }

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            client: Client::new(),
        })
    }

    /// Read the API key from `GROQ_API_KEY` and use the default endpoint
    /// and model.
    pub fn from_env() -> Result<Self, ChatError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ChatError::Request("GROQ_API_KEY is not set".to_string()))?;
        Self::new(DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL, api_key)
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ChatModel for GroqChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
                "stream": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        parse_chat_payload(&payload)
    }
}

fn parse_chat_payload(payload: &Value) -> Result<String, ChatError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|content| content.to_string())
        .ok_or_else(|| ChatError::BackendResponse {
            backend: "chat".to_string(),
            details: "response has no message content".to_string(),
        })
}
